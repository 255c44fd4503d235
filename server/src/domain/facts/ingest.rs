//! Per-job fact ingestion
//!
//! An ingestion job delivers loosely typed rows for one table under one
//! conflict policy. Rows are validated one by one: a malformed row is
//! rejected and counted, it never aborts the batch. Store failures that
//! survive retry do abort it, with the counts so far attached.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Datelike;
use serde::Serialize;
use thiserror::Error;

use super::identity::{ConflictPolicy, FactRow, IncomingFact};
use crate::data::{DataError, FactStore, WriteOutcome};
use crate::domain::audit::AuditSink;
use crate::domain::partitions::{PartitionError, PartitionManager, YearSpan};
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, retry_with_backoff_async};

/// Default rows per write chunk
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Knobs of one ingestion job
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub policy: ConflictPolicy,
    /// Provision the partition for a row's year before writing it
    pub lazy_partitions: bool,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Fills `data_source` for rows that omit it
    pub default_source: Option<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            policy: ConflictPolicy::default(),
            lazy_partitions: true,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            default_source: None,
        }
    }
}

/// Result of writing a single fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Ignored,
    Replaced,
    Rejected { reason: String },
}

impl From<WriteOutcome> for UpsertOutcome {
    fn from(outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Inserted => Self::Inserted,
            WriteOutcome::Ignored => Self::Ignored,
            WriteOutcome::Replaced => Self::Replaced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// Position in the input; the 1-based line number for JSON Lines
    pub index: usize,
    pub reason: String,
}

/// Aggregate counts of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub inserted: u64,
    pub ignored: u64,
    pub replaced: u64,
    pub rejected: Vec<RejectedRow>,
}

impl IngestReport {
    /// Rows accounted for so far
    pub fn processed(&self) -> u64 {
        self.inserted + self.ignored + self.replaced + self.rejected.len() as u64
    }

    fn record(&mut self, index: usize, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Ignored => self.ignored += 1,
            UpsertOutcome::Replaced => self.replaced += 1,
            UpsertOutcome::Rejected { reason } => self.rejected.push(RejectedRow { index, reason }),
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] DataError),

    #[error("Partition coverage failed: {0}")]
    Coverage(#[from] PartitionError),

    #[error("Ingest interrupted after {processed} rows: {source}", processed = .report.processed())]
    Interrupted {
        report: IngestReport,
        #[source]
        source: Box<IngestError>,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    /// Safe to re-run the same input
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Coverage(e) => e.is_transient(),
            Self::Interrupted { source, .. } => source.is_transient(),
            Self::Read { .. } => false,
        }
    }

    /// Counts written before the failure, if any
    pub fn partial_report(&self) -> Option<&IngestReport> {
        match self {
            Self::Interrupted { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Parse JSON Lines; blank lines are skipped, unparseable lines become
/// rejections carrying their line number
pub fn parse_jsonl(text: &str) -> Vec<(usize, Result<IncomingFact, String>)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let parsed = serde_json::from_str::<IncomingFact>(line)
                .map_err(|e| format!("invalid JSON: {}", e));
            (idx + 1, parsed)
        })
        .collect()
}

/// Writes validated facts into one table under one job's settings
pub struct FactIngestor {
    facts: Arc<dyn FactStore>,
    partitions: Arc<PartitionManager>,
    audit: Arc<dyn AuditSink>,
    table: String,
    settings: IngestSettings,
}

impl FactIngestor {
    pub fn new(
        facts: Arc<dyn FactStore>,
        partitions: Arc<PartitionManager>,
        audit: Arc<dyn AuditSink>,
        table: impl Into<String>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            facts,
            partitions,
            audit,
            table: table.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Validate and write one fact under `policy`.
    ///
    /// Identity problems come back as [`UpsertOutcome::Rejected`]; only
    /// store failures are errors.
    pub async fn upsert_fact(
        &self,
        fact: IncomingFact,
        policy: ConflictPolicy,
    ) -> Result<UpsertOutcome, IngestError> {
        let row = match fact.validate(self.settings.default_source.as_deref()) {
            Ok(row) => row,
            Err(reason) => return Ok(UpsertOutcome::Rejected { reason }),
        };
        if self.settings.lazy_partitions {
            self.ensure_year(row.date.year()).await?;
        }
        self.write(&row, policy).await
    }

    /// Write a batch under the job's policy
    pub async fn ingest_batch(&self, facts: Vec<IncomingFact>) -> Result<IngestReport, IngestError> {
        self.ingest_rows(facts.into_iter().map(Ok).enumerate().collect())
            .await
    }

    /// Read a JSON Lines file and ingest every line
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport, IngestError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| IngestError::Read {
                path: path.display().to_string(),
                source,
            })?;
        self.ingest_rows(parse_jsonl(&text)).await
    }

    /// Ingest indexed rows in chunks of `batch_size`
    pub async fn ingest_rows(
        &self,
        rows: Vec<(usize, Result<IncomingFact, String>)>,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let chunk_size = self.settings.batch_size.max(1);

        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<_> = rows.by_ref().take(chunk_size).collect();
            if let Err(e) = self.ingest_chunk(chunk, &mut report).await {
                tracing::error!(
                    table = %self.table,
                    processed = report.processed(),
                    error = %e,
                    "Ingest interrupted"
                );
                self.audit.ingest_finished(&self.table, &report);
                return Err(IngestError::Interrupted {
                    report,
                    source: Box::new(e),
                });
            }
        }

        self.audit.ingest_finished(&self.table, &report);
        Ok(report)
    }

    async fn ingest_chunk(
        &self,
        chunk: Vec<(usize, Result<IncomingFact, String>)>,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let default_source = self.settings.default_source.as_deref();
        let mut valid = Vec::with_capacity(chunk.len());
        for (index, parsed) in chunk {
            match parsed.and_then(|fact| fact.validate(default_source)) {
                Ok(row) => valid.push((index, row)),
                Err(reason) => report.record(index, UpsertOutcome::Rejected { reason }),
            }
        }

        // Only the years actually present, never the span between them
        if self.settings.lazy_partitions {
            let years: BTreeSet<i32> = valid.iter().map(|(_, row)| row.date.year()).collect();
            for year in years {
                self.ensure_year(year).await?;
            }
        }

        for (index, row) in valid {
            let outcome = self.write(&row, self.settings.policy).await?;
            report.record(index, outcome);
        }
        Ok(())
    }

    async fn ensure_year(&self, year: i32) -> Result<(), IngestError> {
        self.partitions
            .ensure_partition_coverage(&self.table, YearSpan::single(year)?)
            .await?;
        Ok(())
    }

    async fn write(&self, row: &FactRow, policy: ConflictPolicy) -> Result<UpsertOutcome, IngestError> {
        let result = retry_with_backoff_async(
            self.settings.max_attempts,
            self.settings.retry_base_delay_ms,
            |e: &DataError| e.is_transient(),
            || self.facts.upsert(&self.table, row, policy),
        )
        .await;

        match result {
            Ok((outcome, attempts)) => {
                if attempts > 1 {
                    tracing::debug!(table = %self.table, identity = %row.identity(), attempts, "Write succeeded after retry");
                }
                Ok(outcome.into())
            }
            Err((DataError::NoPartition { date, .. }, _)) => Ok(UpsertOutcome::Rejected {
                reason: format!("no partition covers date {}", date),
            }),
            Err((DataError::Rejected(reason), _)) => Ok(UpsertOutcome::Rejected { reason }),
            Err((e, attempts)) => {
                tracing::warn!(table = %self.table, attempts, error = %e, "Fact write failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jsonl_numbers_lines() {
        let text = "{\"region_id\":\"06037\"}\n\nnot json\n{\"metric_name\":\"zhvi\"}\n";
        let parsed = parse_jsonl(text);
        let indexes: Vec<usize> = parsed.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![1, 3, 4]);
        assert!(parsed[0].1.is_ok());
        assert!(parsed[1].1.as_ref().unwrap_err().starts_with("invalid JSON"));
    }

    #[test]
    fn test_report_counts() {
        let mut report = IngestReport::default();
        report.record(0, UpsertOutcome::Inserted);
        report.record(1, UpsertOutcome::Ignored);
        report.record(
            2,
            UpsertOutcome::Rejected {
                reason: "missing metric_name".into(),
            },
        );
        assert_eq!(report.processed(), 3);
        assert_eq!(report.rejected[0].index, 2);
    }

    #[test]
    fn test_interrupted_error_message() {
        let err = IngestError::Interrupted {
            report: IngestReport {
                inserted: 4,
                ..Default::default()
            },
            source: Box::new(DataError::Unavailable("connection reset".into()).into()),
        };
        assert!(err.to_string().starts_with("Ingest interrupted after 4 rows"));
        assert!(err.is_transient());
        assert_eq!(err.partial_report().map(|r| r.inserted), Some(4));
    }
}
