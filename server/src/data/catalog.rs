//! Live schema structure as read back from a store
//!
//! These are snapshots: nothing here is cached between calls, every check
//! re-reads the catalog.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::ddl::ConstraintDef;

/// A column as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// A constraint as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintInfo {
    pub table: String,
    pub name: String,
    pub definition: ConstraintDef,
    /// Created on the partition by a parent-level constraint; can only be
    /// dropped by dropping the parent's constraint
    pub inherited: bool,
    /// `COMMENT ON CONSTRAINT` text
    pub comment: Option<String>,
}

impl ConstraintInfo {
    /// Whether this constraint already is `wanted`.
    ///
    /// Check expressions come back from the engine rewritten (casts, extra
    /// parentheses), so a check constraint also matches on the expression
    /// recorded in its comment when it was added.
    pub fn satisfies(&self, wanted: &ConstraintDef) -> bool {
        if self.definition.matches(wanted) {
            return true;
        }
        match (&self.definition, wanted, &self.comment) {
            (ConstraintDef::Check { .. }, ConstraintDef::Check { .. }, Some(recorded)) => {
                ConstraintDef::Check {
                    expression: recorded.clone(),
                }
                .matches(wanted)
            }
            _ => false,
        }
    }
}

/// Inclusive/exclusive date range of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionBounds {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl PartitionBounds {
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.from <= date && date < self.to
    }

    /// True when `[from, to)` lies entirely inside these bounds
    pub fn covers(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.from <= from && to <= self.to
    }

    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.from < to && from < self.to
    }
}

impl fmt::Display for PartitionBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// A child partition of a partitioned table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub name: String,
    /// `None` for a DEFAULT partition or a bound this crate does not model
    pub bounds: Option<PartitionBounds>,
}

/// One identity tuple that occurs more than once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateIdentity {
    /// `(column, value)` pairs; `None` is SQL NULL
    pub values: Vec<(String, Option<String>)>,
    pub count: i64,
}

impl fmt::Display for DuplicateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(col, val)| format!("{}={}", col, val.as_deref().unwrap_or("NULL")))
            .collect();
        write!(f, "({}) x{}", parts.join(", "), self.count)
    }
}

/// Canonical PostgreSQL spelling of a type name, modifiers dropped.
///
/// `information_schema.columns.data_type` reports long-form names
/// (`double precision`, `character varying`) while migrations are usually
/// written with the short aliases.
pub fn normalize_type(data_type: &str) -> String {
    let lowered = data_type.trim().to_lowercase();
    let base = match lowered.find('(') {
        Some(idx) => {
            let close = lowered[idx..].find(')').map(|c| idx + c + 1);
            let mut s = lowered[..idx].trim_end().to_string();
            if let Some(close) = close {
                s.push_str(&lowered[close..]);
            }
            s
        }
        None => lowered,
    };
    let base = base.split_whitespace().collect::<Vec<_>>().join(" ");

    match base.as_str() {
        "int" | "int4" | "integer" | "serial" | "serial4" => "integer",
        "int8" | "bigint" | "bigserial" | "serial8" => "bigint",
        "int2" | "smallint" => "smallint",
        "float8" | "double precision" | "float" => "double precision",
        "float4" | "real" => "real",
        "decimal" | "numeric" => "numeric",
        "bool" | "boolean" => "boolean",
        "varchar" | "character varying" => "character varying",
        "char" | "character" | "bpchar" => "character",
        "timestamptz" | "timestamp with time zone" => "timestamp with time zone",
        "timestamp" | "timestamp without time zone" => "timestamp without time zone",
        "timetz" | "time with time zone" => "time with time zone",
        "time" | "time without time zone" => "time without time zone",
        other => return other.to_string(),
    }
    .to_string()
}

/// Whether an existing column's type satisfies a requested type
pub fn types_compatible(existing: &str, requested: &str) -> bool {
    normalize_type(existing) == normalize_type(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_normalize_type_aliases() {
        assert_eq!(normalize_type("FLOAT8"), "double precision");
        assert_eq!(normalize_type("int4"), "integer");
        assert_eq!(normalize_type("timestamptz"), "timestamp with time zone");
        assert_eq!(normalize_type("jsonb"), "jsonb");
    }

    #[test]
    fn test_normalize_type_drops_modifiers() {
        assert_eq!(normalize_type("varchar(64)"), "character varying");
        assert_eq!(normalize_type("numeric(12, 4)"), "numeric");
        assert_eq!(
            normalize_type("timestamp(3) with time zone"),
            "timestamp with time zone"
        );
    }

    #[test]
    fn test_types_compatible() {
        assert!(types_compatible("double precision", "float8"));
        assert!(types_compatible("character varying", "VARCHAR(255)"));
        assert!(!types_compatible("text", "jsonb"));
    }

    #[test]
    fn test_bounds_cover_and_overlap() {
        let b = PartitionBounds {
            from: d(2015, 1, 1),
            to: d(2016, 1, 1),
        };
        assert!(b.contains_date(d(2015, 6, 30)));
        assert!(!b.contains_date(d(2016, 1, 1)));
        assert!(b.covers(d(2015, 1, 1), d(2016, 1, 1)));
        assert!(!b.covers(d(2015, 1, 1), d(2017, 1, 1)));
        assert!(b.overlaps(d(2015, 7, 1), d(2017, 1, 1)));
        assert!(!b.overlaps(d(2016, 1, 1), d(2017, 1, 1)));
    }

    #[test]
    fn test_duplicate_display() {
        let dup = DuplicateIdentity {
            values: vec![
                ("region_id".into(), Some("06037".into())),
                ("data_source".into(), None),
            ],
            count: 2,
        };
        assert_eq!(dup.to_string(), "(region_id=06037, data_source=NULL) x2");
    }
}
