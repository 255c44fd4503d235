//! Partition provisioning and status

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use super::error::PartitionError;
use super::span::YearSpan;
use crate::data::catalog::{PartitionBounds, PartitionInfo};
use crate::data::ddl::DdlStatement;
use crate::data::{DataError, SchemaStore};
use crate::domain::audit::AuditSink;
use crate::domain::facts::IDENTITY_COLUMNS;
use crate::utils::time::{current_year, year_bounds};

/// Default cap on duplicate identities listed in a conflict report
pub const DEFAULT_DUPLICATE_REPORT_LIMIT: u32 = 20;

/// `<table>_<year>`
pub fn partition_name(table: &str, year: i32) -> String {
    format!("{}_{}", table, year)
}

/// Result of one coverage pass
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub table: String,
    pub span: YearSpan,
    /// Years whose partition this pass created
    pub provisioned: Vec<i32>,
    /// Years an existing partition already covered
    pub already_present: Vec<i32>,
}

/// One partition as seen by `list_partitions`
#[derive(Debug, Clone, Serialize)]
pub struct PartitionStatus {
    pub name: String,
    pub bounds: Option<PartitionBounds>,
    /// Carries a unique constraint over the current identity key
    pub identity_enforced: bool,
    pub constraints: Vec<String>,
}

/// Keeps partitions of the fact table provisioned and constrained
pub struct PartitionManager {
    pub(super) store: Arc<dyn SchemaStore>,
    pub(super) audit: Arc<dyn AuditSink>,
    pub(super) duplicate_report_limit: u32,
}

impl PartitionManager {
    pub fn new(store: Arc<dyn SchemaStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            duplicate_report_limit: DEFAULT_DUPLICATE_REPORT_LIMIT,
        }
    }

    pub fn with_duplicate_report_limit(mut self, limit: u32) -> Self {
        self.duplicate_report_limit = limit.max(1);
        self
    }

    /// Create the partitioned parent table if it is missing
    pub async fn ensure_base_schema(&self, table: &str) -> Result<(), PartitionError> {
        self.store.ensure_base_schema(table).await?;
        tracing::debug!(table, backend = self.store.backend_name(), "Base schema ensured");
        Ok(())
    }

    /// Provision one partition per year in `span`.
    ///
    /// Years already covered are skipped, so an interrupted run can simply be
    /// repeated. A partition that covers only part of a requested year fails
    /// the call before anything is created.
    pub async fn ensure_partition_coverage(
        &self,
        table: &str,
        span: YearSpan,
    ) -> Result<CoverageReport, PartitionError> {
        if !self.store.table_exists(table).await? {
            return Err(DataError::UnknownTable(table.to_string()).into());
        }
        let existing = self.store.partitions(table).await?;

        let mut missing = Vec::new();
        let mut already_present = Vec::new();
        for year in span.years() {
            let (from, to) = year_bounds(year)
                .ok_or_else(|| PartitionError::InvalidRange(format!("year {}", year)))?;
            if covering(&existing, from, to).is_some() {
                already_present.push(year);
                continue;
            }
            if let Some(other) = existing
                .iter()
                .find(|p| p.bounds.is_some_and(|b| b.overlaps(from, to)))
            {
                return Err(PartitionError::OverlappingPartition {
                    year,
                    partition: other.name.clone(),
                });
            }
            missing.push((year, from, to));
        }

        let mut provisioned = Vec::with_capacity(missing.len());
        for (year, from, to) in missing {
            let statement = DdlStatement::CreatePartition {
                parent: table.to_string(),
                name: partition_name(table, year),
                from,
                to,
            };
            match self.store.execute(&statement).await {
                Ok(()) => {
                    tracing::debug!(table, year, "Partition provisioned");
                    provisioned.push(year);
                }
                Err(e) if e.is_already_exists() => already_present.push(year),
                Err(source) => {
                    tracing::warn!(
                        table,
                        year,
                        provisioned = provisioned.len(),
                        error = %source,
                        "Partition provisioning interrupted"
                    );
                    return Err(PartitionError::ProvisionFailed {
                        year,
                        provisioned: provisioned.len(),
                        source,
                    });
                }
            }
        }

        already_present.sort_unstable();
        let report = CoverageReport {
            table: table.to_string(),
            span,
            provisioned,
            already_present,
        };
        self.audit.coverage_ensured(&report);
        Ok(report)
    }

    /// Cover `history_start_year` through the current year plus `forward_years`
    pub async fn ensure_history_coverage(
        &self,
        table: &str,
        history_start_year: i32,
        forward_years: u32,
    ) -> Result<CoverageReport, PartitionError> {
        let forward = i32::try_from(forward_years)
            .map_err(|_| PartitionError::InvalidRange(format!("forward_years {}", forward_years)))?;
        let span = YearSpan::new(history_start_year, current_year() + forward)?;
        self.ensure_partition_coverage(table, span).await
    }

    /// Partitions with their bounds and identity-constraint status
    pub async fn list_partitions(&self, table: &str) -> Result<Vec<PartitionStatus>, PartitionError> {
        let partitions = self.store.partitions(table).await?;
        let mut statuses = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let constraints = self.store.constraints(&partition.name).await?;
            statuses.push(PartitionStatus {
                identity_enforced: constraints
                    .iter()
                    .any(|c| c.definition.is_unique_on(&IDENTITY_COLUMNS)),
                constraints: constraints.into_iter().map(|c| c.name).collect(),
                name: partition.name,
                bounds: partition.bounds,
            });
        }
        Ok(statuses)
    }
}

fn covering(partitions: &[PartitionInfo], from: NaiveDate, to: NaiveDate) -> Option<&PartitionInfo> {
    partitions
        .iter()
        .find(|p| p.bounds.is_some_and(|b| b.covers(from, to)))
}
