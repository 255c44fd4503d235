//! PostgreSQL schema definitions
//!
//! The fact table is range-partitioned on `date`. Partitions are not created
//! here; the partition manager provisions them per calendar year.

use crate::domain::facts::{IDENTITY_COLUMNS, identity_constraint_name};
use crate::utils::sql::quote_ident;

/// DDL for the partitioned parent table, current identity included
pub fn base_schema_sql(table: &str) -> String {
    let key = IDENTITY_COLUMNS
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    region_id TEXT NOT NULL,
    date DATE NOT NULL,
    metric_name TEXT NOT NULL,
    data_source TEXT NOT NULL,
    metric_value DOUBLE PRECISION,
    attributes JSONB NOT NULL DEFAULT '{{}}'::jsonb,
    CONSTRAINT {constraint} UNIQUE ({key})
) PARTITION BY RANGE (date);
"#,
        table = quote_ident(table),
        constraint = quote_ident(&identity_constraint_name(table)),
        key = key,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_schema_is_partitioned_with_identity() {
        let sql = base_schema_sql("market_time_series");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"market_time_series\""));
        assert!(sql.contains("PARTITION BY RANGE (date)"));
        assert!(sql.contains(
            "CONSTRAINT \"market_time_series_identity_key\" UNIQUE \
             (\"region_id\", \"date\", \"metric_name\", \"data_source\", \"attributes\")"
        ));
        assert!(sql.contains("DEFAULT '{}'::jsonb"));
    }
}
