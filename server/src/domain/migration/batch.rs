//! Migration batches and the fluent builder

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::MigrationError;
use super::operation::{ColumnOptions, MigrationOperation};
use crate::data::ddl::{ConstraintDef, DdlStatement};

/// Name of the built-in batch that moves the fact table to the five-column identity
pub const IDENTITY_V2: &str = "identity_v2";

/// An ordered list of structural operations.
///
/// Operations run in the order given; the builder never reorders or infers
/// dependencies, so a column must be added before an index that uses it.
///
/// ```
/// use metricstore_server::domain::migration::{ColumnOptions, MigrationBatch};
///
/// let batch = MigrationBatch::new("add_vintage")
///     .add_column(
///         "market_time_series",
///         "vintage",
///         "date",
///         ColumnOptions::new(),
///     )
///     .create_index("idx_mts_vintage", "market_time_series", &["vintage"]);
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationBatch {
    name: String,
    #[serde(default)]
    operations: Vec<MigrationOperation>,
}

impl MigrationBatch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    pub fn push(mut self, operation: MigrationOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn add_column(
        self,
        table: &str,
        column: &str,
        data_type: &str,
        options: ColumnOptions,
    ) -> Self {
        self.push(MigrationOperation::AddColumn {
            table: table.to_string(),
            column: column.to_string(),
            data_type: data_type.to_string(),
            options,
        })
    }

    pub fn create_index(self, name: &str, table: &str, columns: &[&str]) -> Self {
        self.index(name, table, columns, false)
    }

    pub fn create_unique_index(self, name: &str, table: &str, columns: &[&str]) -> Self {
        self.index(name, table, columns, true)
    }

    fn index(self, name: &str, table: &str, columns: &[&str], unique: bool) -> Self {
        self.push(MigrationOperation::CreateIndex {
            name: name.to_string(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        })
    }

    pub fn add_constraint(self, name: &str, table: &str, definition: ConstraintDef) -> Self {
        self.replace_constraint(name, table, definition, &[])
    }

    /// Add a constraint, dropping earlier versions whose names match `replaces`
    pub fn replace_constraint(
        self,
        name: &str,
        table: &str,
        definition: ConstraintDef,
        replaces: &[&str],
    ) -> Self {
        self.push(MigrationOperation::AddConstraint {
            name: name.to_string(),
            table: table.to_string(),
            definition,
            replaces: replaces.iter().map(|p| p.to_string()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operations(&self) -> &[MigrationOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Statements for a schema where none of the batch is applied yet.
    ///
    /// [`MigrationRunner::render`](super::MigrationRunner::render) gives the
    /// statements for the live schema instead.
    pub fn statements(&self) -> Vec<DdlStatement> {
        self.operations
            .iter()
            .flat_map(MigrationOperation::statements)
            .collect()
    }

    /// SHA-256 over the batch name and its unconditional statements
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        for statement in self.statements() {
            hasher.update(b"\n");
            hasher.update(statement.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn from_json(text: &str) -> Result<Self, MigrationError> {
        serde_json::from_str(text).map_err(|e| MigrationError::InvalidOperation {
            index: 0,
            reason: format!("unparseable batch: {}", e),
        })
    }

    /// Look up a batch shipped with the binary
    pub fn builtin(name: &str, table: &str) -> Option<Self> {
        match name {
            IDENTITY_V2 => Some(Self::identity_v2(table)),
            _ => None,
        }
    }

    /// Columns and indexes of the five-column identity.
    ///
    /// The unique key itself is moved with
    /// [`propagate_constraint`](crate::domain::partitions::PartitionManager::propagate_constraint),
    /// which also cleans partition-level copies of the old key.
    pub fn identity_v2(table: &str) -> Self {
        Self::new(IDENTITY_V2)
            .add_column(
                table,
                "data_source",
                "text",
                ColumnOptions::new().not_null().default_value("'unknown'"),
            )
            .add_column(
                table,
                "attributes",
                "jsonb",
                ColumnOptions::new().not_null().default_value("'{}'::jsonb"),
            )
            .create_index(
                &format!("idx_{}_metric_date", table),
                table,
                &["metric_name", "date"],
            )
            .create_index(
                &format!("idx_{}_source", table),
                table,
                &["data_source"],
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_v2_shape() {
        let batch = MigrationBatch::identity_v2("market_time_series");
        assert_eq!(batch.name(), "identity_v2");
        let rendered: Vec<String> = batch.statements().iter().map(|s| s.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "ALTER TABLE \"market_time_series\" ADD COLUMN \"data_source\" text DEFAULT 'unknown'",
                "ALTER TABLE \"market_time_series\" ALTER COLUMN \"data_source\" SET NOT NULL",
                "ALTER TABLE \"market_time_series\" ADD COLUMN \"attributes\" jsonb DEFAULT '{}'::jsonb",
                "ALTER TABLE \"market_time_series\" ALTER COLUMN \"attributes\" SET NOT NULL",
                "CREATE INDEX IF NOT EXISTS \"idx_market_time_series_metric_date\" ON \"market_time_series\" (\"metric_name\", \"date\")",
                "CREATE INDEX IF NOT EXISTS \"idx_market_time_series_source\" ON \"market_time_series\" (\"data_source\")",
            ]
        );
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(MigrationBatch::builtin("identity_v2", "t").is_some());
        assert!(MigrationBatch::builtin("identity_v9", "t").is_none());
    }

    #[test]
    fn test_checksum_is_stable_and_content_sensitive() {
        let a = MigrationBatch::identity_v2("market_time_series");
        let b = MigrationBatch::identity_v2("market_time_series");
        let c = MigrationBatch::identity_v2("other_table");
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
        assert_eq!(a.checksum().len(), 64);
    }

    #[test]
    fn test_json_round_trip_of_file_format() {
        let text = r#"{
            "name": "add_vintage",
            "operations": [
                {"op": "add_column", "table": "t", "column": "vintage", "type": "date"},
                {"op": "create_index", "name": "idx_t_vintage", "table": "t", "columns": ["vintage"]}
            ]
        }"#;
        let batch = MigrationBatch::from_json(text).unwrap();
        assert_eq!(batch.name(), "add_vintage");
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch,
            MigrationBatch::new("add_vintage")
                .add_column("t", "vintage", "date", ColumnOptions::new())
                .create_index("idx_t_vintage", "t", &["vintage"])
        );
    }

    #[test]
    fn test_unparseable_batch_is_invalid_operation() {
        let err = MigrationBatch::from_json("{\"name\": 3}").unwrap_err();
        assert!(err.is_configuration());
    }
}
