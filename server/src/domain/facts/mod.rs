//! Fact identity and ingestion
//!
//! A fact is one observation: region, date, metric, source, value, plus an
//! open attribute document. The first five fields minus the value form its
//! identity; `attributes` takes part in it through its canonical form.

mod attributes;
mod identity;
mod ingest;

pub use attributes::Attributes;
pub use identity::{
    ConflictPolicy, FactIdentity, FactRow, IDENTITY_COLUMNS, IncomingFact,
    LEGACY_IDENTITY_COLUMNS, identity_columns, identity_constraint_name,
};
pub use ingest::{
    DEFAULT_BATCH_SIZE, FactIngestor, IngestError, IngestReport, IngestSettings, RejectedRow,
    UpsertOutcome, parse_jsonl,
};

#[cfg(test)]
mod tests;
