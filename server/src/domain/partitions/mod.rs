//! Partition & Constraint Manager
//!
//! The fact table is range-partitioned by calendar year on `date`. This
//! module provisions partitions for a span of years and keeps every
//! partition's unique constraint in step with the parent's identity key.

mod constraint;
mod error;
mod manager;
mod span;

pub use constraint::PropagationReport;
pub use error::PartitionError;
pub use manager::{
    CoverageReport, DEFAULT_DUPLICATE_REPORT_LIMIT, PartitionManager, PartitionStatus,
    partition_name,
};
pub use span::YearSpan;
