//! Warehouse core
//!
//! - `migration` - Idempotent structural migration batches
//! - `partitions` - Yearly partition provisioning and identity key propagation
//! - `facts` - Fact identity, attribute canonicalization, ingestion policy
//! - `audit` - Sink for migration, partition and ingestion reports

pub mod audit;
pub mod facts;
pub mod migration;
pub mod partitions;

pub use audit::{AuditSink, TracingAuditSink};
