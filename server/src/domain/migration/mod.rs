//! Migration Builder
//!
//! A batch describes structural changes declaratively; the runner diffs each
//! operation against the live schema and runs only what is missing, so a
//! batch can be re-run after a partial failure:
//! - `operation` - add column, create index, add/replace constraint
//! - `batch` - fluent builder, file format, built-in batches, checksum
//! - `plan` - per-operation diff against the catalog
//! - `runner` - `render` (dry run) and `execute`
//! - `result` - per-operation outcomes

mod batch;
mod error;
mod operation;
mod plan;
mod result;
mod runner;

pub use batch::{IDENTITY_V2, MigrationBatch};
pub use error::MigrationError;
pub use operation::{ColumnOptions, MigrationOperation};
pub use plan::{Plan, plan_operation};
pub use result::{MigrationReport, OperationResult, OperationStatus};
pub use runner::MigrationRunner;
