//! Audit sink for migration, partition and ingestion reports

use crate::domain::facts::IngestReport;
use crate::domain::migration::{MigrationReport, OperationStatus};
use crate::domain::partitions::{CoverageReport, PropagationReport};

/// Receives every report the core produces.
///
/// Implementations must not fail; a sink that cannot deliver logs and drops.
pub trait AuditSink: Send + Sync {
    fn migration_finished(&self, report: &MigrationReport);

    fn coverage_ensured(&self, report: &CoverageReport);

    fn constraint_propagated(&self, report: &PropagationReport);

    fn ingest_finished(&self, table: &str, report: &IngestReport);
}

/// Writes reports as structured tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn migration_finished(&self, report: &MigrationReport) {
        tracing::info!(
            batch = %report.batch,
            checksum = %report.checksum,
            backend = %report.backend,
            applied = report.applied(),
            already_satisfied = report.already_satisfied(),
            failed = report.failed(),
            "Migration batch finished"
        );
        for failure in report.failures() {
            if let OperationStatus::Failed { reason, category } = &failure.status {
                tracing::warn!(
                    batch = %report.batch,
                    index = failure.index,
                    operation = %failure.operation,
                    category = %category,
                    reason = %reason,
                    "Migration operation failed"
                );
            }
        }
    }

    fn coverage_ensured(&self, report: &CoverageReport) {
        tracing::info!(
            table = %report.table,
            from = report.span.first,
            to = report.span.last,
            provisioned = report.provisioned.len(),
            already_present = report.already_present.len(),
            "Partition coverage ensured"
        );
    }

    fn constraint_propagated(&self, report: &PropagationReport) {
        tracing::info!(
            table = %report.table,
            dropped = ?report.dropped,
            added = ?report.added,
            partitions = report.partitions_checked,
            "Identity constraint propagated"
        );
    }

    fn ingest_finished(&self, table: &str, report: &IngestReport) {
        tracing::info!(
            table,
            inserted = report.inserted,
            ignored = report.ignored,
            replaced = report.replaced,
            rejected = report.rejected.len(),
            "Ingest batch finished"
        );
        for row in &report.rejected {
            tracing::warn!(table, index = row.index, reason = %row.reason, "Row rejected");
        }
    }
}
