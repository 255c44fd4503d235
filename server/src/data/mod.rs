//! Data storage layer
//!
//! - `postgres` - PostgreSQL warehouse (production)
//! - `memory` - In-process warehouse with the same semantics (tests, dry runs)
//! - `traits` - `SchemaStore` and `FactStore`, the only way the domain reaches storage
//! - `ddl` - Structured DDL statements and their SQL rendering
//! - `catalog` - Live schema snapshots (columns, constraints, partitions)
//! - `error` - Unified error type for all backends

pub mod catalog;
pub mod ddl;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::MemoryWarehouse;
pub use postgres::PostgresService;

pub use error::DataError;

pub use traits::{FactStore, MigrationLock, SchemaStore, WriteOutcome};

use std::sync::Arc;

/// A backend seen through both channels
pub trait Warehouse: SchemaStore + FactStore {}

impl<T: SchemaStore + FactStore> Warehouse for T {}

/// Shared handles to one warehouse backend
#[derive(Clone)]
pub struct WarehouseHandles {
    pub schema: Arc<dyn SchemaStore>,
    pub facts: Arc<dyn FactStore>,
}

impl WarehouseHandles {
    pub fn new<W: Warehouse + 'static>(warehouse: Arc<W>) -> Self {
        Self {
            schema: warehouse.clone(),
            facts: warehouse,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.schema.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_share_backend() {
        let handles = WarehouseHandles::new(Arc::new(MemoryWarehouse::new()));
        assert_eq!(handles.backend_name(), "memory");
    }
}
