//! Fact channel: identity-keyed writes against the partitioned table

use async_trait::async_trait;
use chrono::NaiveDate;

use super::PostgresService;
use super::error::{CHECK_VIOLATION, classify, sqlstate};
use crate::data::error::DataError;
use crate::data::traits::{FactStore, WriteOutcome};
use crate::domain::facts::{
    Attributes, ConflictPolicy, FactIdentity, FactRow, IDENTITY_COLUMNS,
};
use crate::utils::sql::quote_ident;

fn insert_sql(table: &str, policy: Option<ConflictPolicy>) -> String {
    let mut sql = format!(
        "INSERT INTO {} (region_id, date, metric_name, data_source, metric_value, attributes) \
         VALUES ($1, $2, $3, $4, $5, $6::jsonb)",
        quote_ident(table)
    );
    if let Some(policy) = policy {
        let target = IDENTITY_COLUMNS.join(", ");
        match policy {
            ConflictPolicy::Ignore => {
                sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", target));
            }
            ConflictPolicy::Replace => {
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO UPDATE SET metric_value = EXCLUDED.metric_value",
                    target
                ));
            }
        }
        // xmax is zero only for a freshly inserted tuple
        sql.push_str(" RETURNING (xmax = 0) AS inserted");
    }
    sql
}

/// `no partition of relation ... found for row` arrives as a check violation
fn map_write_error(err: sqlx::Error, table: &str, date: NaiveDate) -> DataError {
    if sqlstate(&err).as_deref() == Some(CHECK_VIOLATION)
        && err.to_string().contains("no partition")
    {
        return DataError::NoPartition {
            table: table.to_string(),
            date,
        };
    }
    classify(err)
}

type StoredRow = (String, NaiveDate, String, String, Option<f64>, String);

#[async_trait]
impl FactStore for PostgresService {
    async fn upsert(
        &self,
        table: &str,
        row: &FactRow,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, DataError> {
        let sql = insert_sql(table, Some(policy));
        let inserted: Option<bool> = sqlx::query_scalar(&sql)
            .bind(&row.region_id)
            .bind(row.date)
            .bind(&row.metric_name)
            .bind(&row.data_source)
            .bind(row.metric_value)
            .bind(row.attributes.canonical())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_write_error(e, table, row.date))?;

        Ok(match inserted {
            None => WriteOutcome::Ignored,
            Some(true) => WriteOutcome::Inserted,
            Some(false) => WriteOutcome::Replaced,
        })
    }

    async fn insert(&self, table: &str, row: &FactRow) -> Result<(), DataError> {
        let sql = insert_sql(table, None);
        sqlx::query(&sql)
            .bind(&row.region_id)
            .bind(row.date)
            .bind(&row.metric_name)
            .bind(&row.data_source)
            .bind(row.metric_value)
            .bind(row.attributes.canonical())
            .execute(self.pool())
            .await
            .map_err(|e| map_write_error(e, table, row.date))?;
        Ok(())
    }

    async fn fetch(
        &self,
        table: &str,
        identity: &FactIdentity,
    ) -> Result<Option<FactRow>, DataError> {
        let sql = format!(
            "SELECT region_id, date, metric_name, data_source, metric_value, attributes::text \
             FROM {} WHERE region_id = $1 AND date = $2 AND metric_name = $3 \
             AND data_source = $4 AND attributes = $5::jsonb",
            quote_ident(table)
        );
        let stored: Option<StoredRow> = sqlx::query_as(&sql)
            .bind(&identity.region_id)
            .bind(identity.date)
            .bind(&identity.metric_name)
            .bind(&identity.data_source)
            .bind(identity.attributes.canonical())
            .fetch_optional(self.pool())
            .await
            .map_err(classify)?;

        let Some((region_id, date, metric_name, data_source, metric_value, attrs)) = stored else {
            return Ok(None);
        };

        let attributes = serde_json::from_str::<serde_json::Value>(&attrs)
            .map_err(|e| e.to_string())
            .and_then(Attributes::from_json)
            .map_err(|e| DataError::Rejected(format!("stored attributes unreadable: {}", e)))?;

        Ok(Some(
            FactRow::new(region_id, date, metric_name, data_source, metric_value)
                .with_attributes(attributes),
        ))
    }

    async fn count(&self, table: &str) -> Result<u64, DataError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let n: i64 = sqlx::query_scalar(&sql)
            .fetch_one(self.pool())
            .await
            .map_err(classify)?;
        Ok(n.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_sql_targets_full_identity() {
        let sql = insert_sql("market_time_series", Some(ConflictPolicy::Ignore));
        assert!(sql.starts_with("INSERT INTO \"market_time_series\""));
        assert!(sql.contains(
            "ON CONFLICT (region_id, date, metric_name, data_source, attributes) DO NOTHING"
        ));
        assert!(sql.ends_with("RETURNING (xmax = 0) AS inserted"));
    }

    #[test]
    fn test_replace_sql_overwrites_value_only() {
        let sql = insert_sql("t", Some(ConflictPolicy::Replace));
        assert!(sql.contains("DO UPDATE SET metric_value = EXCLUDED.metric_value"));
    }

    #[test]
    fn test_plain_insert_has_no_conflict_clause() {
        let sql = insert_sql("t", None);
        assert!(!sql.contains("ON CONFLICT"));
        assert!(!sql.contains("RETURNING"));
    }
}
