//! Schema channel over the PostgreSQL system catalogs

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use sqlx::Row;

use super::PostgresService;
use super::error::classify;
use super::schema::base_schema_sql;
use crate::data::catalog::{
    ColumnInfo, ConstraintInfo, DuplicateIdentity, PartitionBounds, PartitionInfo,
};
use crate::data::ddl::{ConstraintDef, DdlStatement};
use crate::data::error::DataError;
use crate::data::traits::{MigrationLock, SchemaStore};
use crate::utils::sql::quote_ident;

const COLUMN_SQL: &str = r#"
SELECT column_name::text,
       CASE WHEN data_type = 'USER-DEFINED' THEN udt_name::text ELSE data_type::text END,
       is_nullable = 'YES',
       column_default::text
FROM information_schema.columns
WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2
"#;

const INDEX_EXISTS_SQL: &str = r#"
SELECT EXISTS (
    SELECT 1 FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relname = $1 AND c.relkind IN ('i', 'I') AND n.nspname = current_schema()
)
"#;

const CONSTRAINTS_SQL: &str = r#"
SELECT con.conname::text,
       con.contype::text,
       (con.conparentid <> 0 OR NOT con.conislocal),
       pg_get_constraintdef(con.oid),
       obj_description(con.oid, 'pg_constraint'),
       COALESCE(
           array_agg(att.attname::text ORDER BY k.ord) FILTER (WHERE att.attname IS NOT NULL),
           ARRAY[]::text[]
       )
FROM pg_constraint con
JOIN pg_class rel ON rel.oid = con.conrelid
JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
LEFT JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) ON TRUE
LEFT JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
WHERE rel.relname = $1 AND nsp.nspname = current_schema() AND con.contype IN ('u', 'p', 'c')
GROUP BY con.oid, con.conname, con.contype, con.conparentid, con.conislocal
ORDER BY con.conname
"#;

const PARTITIONS_SQL: &str = r#"
SELECT child.relname::text, pg_get_expr(child.relpartbound, child.oid)
FROM pg_inherits i
JOIN pg_class parent ON parent.oid = i.inhparent
JOIN pg_class child ON child.oid = i.inhrelid
JOIN pg_namespace n ON n.oid = parent.relnamespace
WHERE parent.relname = $1 AND n.nspname = current_schema()
ORDER BY child.relname
"#;

/// Parse `FOR VALUES FROM ('2015-01-01') TO ('2016-01-01')`.
///
/// `MINVALUE`/`MAXVALUE` map to the extreme dates. Returns `None` for a
/// DEFAULT partition or a bound over something other than one date column.
pub(super) fn parse_partition_bound(expr: &str) -> Option<PartitionBounds> {
    static RE_RANGE: OnceLock<Regex> = OnceLock::new();
    let re = RE_RANGE.get_or_init(|| {
        Regex::new(r"(?i)FOR VALUES FROM \(([^,()]+)\) TO \(([^,()]+)\)").expect("Invalid regex")
    });

    let caps = re.captures(expr)?;
    let from = parse_bound_value(caps.get(1)?.as_str())?;
    let to = parse_bound_value(caps.get(2)?.as_str())?;
    Some(PartitionBounds { from, to })
}

fn parse_bound_value(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    match raw.to_ascii_uppercase().as_str() {
        "MINVALUE" => Some(NaiveDate::MIN),
        "MAXVALUE" => Some(NaiveDate::MAX),
        _ => {
            let unquoted = raw.trim_start_matches('\'').trim_end_matches('\'');
            NaiveDate::parse_from_str(unquoted, "%Y-%m-%d").ok()
        }
    }
}

impl PostgresService {
    async fn require_table(&self, table: &str) -> Result<(), DataError> {
        if self.table_exists(table).await? {
            Ok(())
        } else {
            Err(DataError::UnknownTable(table.to_string()))
        }
    }
}

#[async_trait]
impl SchemaStore for PostgresService {
    async fn table_exists(&self, table: &str) -> Result<bool, DataError> {
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(quote_ident(table))
            .fetch_one(self.pool())
            .await
            .map_err(classify)
    }

    async fn column(&self, table: &str, column: &str) -> Result<Option<ColumnInfo>, DataError> {
        let row: Option<(String, String, bool, Option<String>)> = sqlx::query_as(COLUMN_SQL)
            .bind(table)
            .bind(column)
            .fetch_optional(self.pool())
            .await
            .map_err(classify)?;

        Ok(row.map(|(name, data_type, nullable, default)| ColumnInfo {
            name,
            data_type,
            nullable,
            default,
        }))
    }

    async fn index_exists(&self, name: &str) -> Result<bool, DataError> {
        sqlx::query_scalar::<_, bool>(INDEX_EXISTS_SQL)
            .bind(name)
            .fetch_one(self.pool())
            .await
            .map_err(classify)
    }

    async fn constraints(&self, table: &str) -> Result<Vec<ConstraintInfo>, DataError> {
        self.require_table(table).await?;

        let rows: Vec<(String, String, bool, String, Option<String>, Vec<String>)> =
            sqlx::query_as(CONSTRAINTS_SQL)
                .bind(table)
                .fetch_all(self.pool())
                .await
                .map_err(classify)?;

        Ok(rows
            .into_iter()
            .map(|(name, contype, inherited, definition, comment, columns)| {
                let definition = match contype.as_str() {
                    "c" => ConstraintDef::Check {
                        expression: definition,
                    },
                    _ => ConstraintDef::Unique { columns },
                };
                ConstraintInfo {
                    table: table.to_string(),
                    name,
                    definition,
                    inherited,
                    comment,
                }
            })
            .collect())
    }

    async fn partitions(&self, table: &str) -> Result<Vec<PartitionInfo>, DataError> {
        self.require_table(table).await?;

        let rows: Vec<(String, Option<String>)> = sqlx::query_as(PARTITIONS_SQL)
            .bind(table)
            .fetch_all(self.pool())
            .await
            .map_err(classify)?;

        Ok(rows
            .into_iter()
            .map(|(name, bound)| {
                let bounds = bound.as_deref().and_then(parse_partition_bound);
                if bounds.is_none() {
                    tracing::debug!(partition = %name, bound = ?bound, "Partition without date range");
                }
                PartitionInfo { name, bounds }
            })
            .collect())
    }

    async fn duplicate_identities(
        &self,
        table: &str,
        columns: &[String],
        limit: u32,
    ) -> Result<Vec<DuplicateIdentity>, DataError> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let select = columns
            .iter()
            .map(|c| format!("{}::text", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let group = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {select}, COUNT(*) FROM {table} GROUP BY {group} HAVING COUNT(*) > 1 LIMIT $1",
            table = quote_ident(table),
        );

        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(classify)?;

        let mut duplicates = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for (i, col) in columns.iter().enumerate() {
                let value: Option<String> = row.try_get(i).map_err(classify)?;
                values.push((col.clone(), value));
            }
            let count: i64 = row.try_get(columns.len()).map_err(classify)?;
            duplicates.push(DuplicateIdentity { values, count });
        }
        Ok(duplicates)
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<(), DataError> {
        let sql = statement.to_string();
        tracing::debug!(sql = %sql, "Executing DDL");
        sqlx::raw_sql(&sql)
            .execute(self.pool())
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn ensure_base_schema(&self, table: &str) -> Result<(), DataError> {
        sqlx::raw_sql(&base_schema_sql(table))
            .execute(self.pool())
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn acquire_migration_lock(&self) -> Result<MigrationLock, DataError> {
        let mut conn = self.pool().acquire().await.map_err(classify)?.detach();
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(self.lock_key)
            .execute(&mut conn)
            .await
            .map_err(classify)?;
        tracing::debug!(lock_key = self.lock_key, "Migration lock acquired");
        Ok(MigrationLock::postgres(conn))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_year_bound() {
        let bounds =
            parse_partition_bound("FOR VALUES FROM ('2015-01-01') TO ('2016-01-01')").unwrap();
        assert_eq!(bounds.from, d(2015, 1, 1));
        assert_eq!(bounds.to, d(2016, 1, 1));
    }

    #[test]
    fn test_parse_open_bounds() {
        let bounds = parse_partition_bound("FOR VALUES FROM (MINVALUE) TO ('2000-01-01')").unwrap();
        assert_eq!(bounds.from, NaiveDate::MIN);
        assert_eq!(bounds.to, d(2000, 1, 1));

        let bounds = parse_partition_bound("FOR VALUES FROM ('2030-01-01') TO (MAXVALUE)").unwrap();
        assert_eq!(bounds.to, NaiveDate::MAX);
    }

    #[test]
    fn test_parse_default_partition() {
        assert_eq!(parse_partition_bound("DEFAULT"), None);
    }

    #[test]
    fn test_parse_multi_column_bound_unsupported() {
        assert_eq!(
            parse_partition_bound("FOR VALUES FROM ('2015-01-01', 1) TO ('2016-01-01', 1)"),
            None
        );
    }
}
