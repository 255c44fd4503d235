//! Structured DDL statements
//!
//! Every structural change the warehouse makes goes through [`DdlStatement`].
//! `Display` renders the exact PostgreSQL text that is executed (and shown in
//! dry runs); the in-memory backend interprets the structure directly.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::sql::{normalize_sql_fragment, quote_ident, quote_ident_list, quote_literal};

/// Definition of a table constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintDef {
    Unique { columns: Vec<String> },
    Check { expression: String },
}

impl ConstraintDef {
    pub fn unique<S: AsRef<str>>(columns: &[S]) -> Self {
        Self::Unique {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
        }
    }

    /// Structural equality: unique constraints compare as column *sets*,
    /// check constraints by normalized expression text. Names never matter.
    pub fn matches(&self, other: &ConstraintDef) -> bool {
        match (self, other) {
            (Self::Unique { columns: a }, Self::Unique { columns: b }) => {
                column_set(a) == column_set(b)
            }
            (Self::Check { expression: a }, Self::Check { expression: b }) => {
                normalize_check(a) == normalize_check(b)
            }
            _ => false,
        }
    }

    /// True for a unique constraint over exactly this set of columns
    pub fn is_unique_on<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        match self {
            Self::Unique { columns: own } => {
                column_set(own) == columns.iter().map(|c| c.as_ref()).collect::<BTreeSet<_>>()
            }
            Self::Check { .. } => false,
        }
    }

    pub fn unique_columns(&self) -> Option<&[String]> {
        match self {
            Self::Unique { columns } => Some(columns),
            Self::Check { .. } => None,
        }
    }
}

impl fmt::Display for ConstraintDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unique { columns } => write!(f, "UNIQUE ({})", quote_ident_list(columns)),
            Self::Check { expression } => write!(f, "CHECK ({})", expression),
        }
    }
}

fn column_set(columns: &[String]) -> BTreeSet<&str> {
    columns.iter().map(String::as_str).collect()
}

/// Strip `CHECK` and redundant outer parentheses, then normalize whitespace/case.
///
/// `pg_get_constraintdef` reports `CHECK ((metric_value >= (0)::double precision))`
/// style text; callers write `metric_value >= 0`. Only the wrapping is removed,
/// so reformatted inner expressions still compare unequal.
fn normalize_check(expr: &str) -> String {
    let mut s = normalize_sql_fragment(expr);
    if let Some(rest) = s.strip_prefix("check")
        && (rest.starts_with(' ') || rest.starts_with('('))
    {
        s = rest.trim().to_string();
    }
    while s.starts_with('(') && s.ends_with(')') && wraps_whole(&s) {
        s = s[1..s.len() - 1].trim().to_string();
    }
    s
}

fn wraps_whole(s: &str) -> bool {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != s.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// One structural statement
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    AddColumn {
        table: String,
        column: String,
        data_type: String,
        /// SQL expression; existing rows take this value when the column is added
        default: Option<String>,
    },
    SetDefault {
        table: String,
        column: String,
        default: String,
    },
    /// Fill rows left NULL by a column that pre-dates its default
    BackfillDefault {
        table: String,
        column: String,
        default: String,
    },
    SetNotNull {
        table: String,
        column: String,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
    AddConstraint {
        table: String,
        name: String,
        definition: ConstraintDef,
    },
    DropConstraint {
        table: String,
        name: String,
    },
    /// Record the requested check expression next to the constraint
    CommentConstraint {
        table: String,
        name: String,
        comment: String,
    },
    CreatePartition {
        parent: String,
        name: String,
        from: NaiveDate,
        to: NaiveDate,
    },
}

impl DdlStatement {
    /// Table the statement acts on
    pub fn table(&self) -> &str {
        match self {
            Self::AddColumn { table, .. }
            | Self::SetDefault { table, .. }
            | Self::BackfillDefault { table, .. }
            | Self::SetNotNull { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::AddConstraint { table, .. }
            | Self::DropConstraint { table, .. }
            | Self::CommentConstraint { table, .. } => table,
            Self::CreatePartition { parent, .. } => parent,
        }
    }

    /// Statements that take an ACCESS EXCLUSIVE lock while they scan the table
    pub fn takes_exclusive_lock(&self) -> bool {
        matches!(
            self,
            Self::SetNotNull { .. }
                | Self::AddConstraint { .. }
                | Self::BackfillDefault { .. }
                | Self::CreatePartition { .. }
        )
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddColumn {
                table,
                column,
                data_type,
                default,
            } => {
                write!(
                    f,
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(table),
                    quote_ident(column),
                    data_type
                )?;
                if let Some(default) = default {
                    write!(f, " DEFAULT {}", default)?;
                }
                Ok(())
            }
            Self::SetDefault {
                table,
                column,
                default,
            } => write!(
                f,
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                quote_ident(table),
                quote_ident(column),
                default
            ),
            Self::BackfillDefault {
                table,
                column,
                default,
            } => write!(
                f,
                "UPDATE {} SET {} = {} WHERE {} IS NULL",
                quote_ident(table),
                quote_ident(column),
                default,
                quote_ident(column)
            ),
            Self::SetNotNull { table, column } => write!(
                f,
                "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                quote_ident(table),
                quote_ident(column)
            ),
            Self::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => write!(
                f,
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                if *unique { "UNIQUE " } else { "" },
                quote_ident(name),
                quote_ident(table),
                quote_ident_list(columns)
            ),
            Self::AddConstraint {
                table,
                name,
                definition,
            } => write!(
                f,
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                quote_ident(table),
                quote_ident(name),
                definition
            ),
            Self::DropConstraint { table, name } => write!(
                f,
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
                quote_ident(table),
                quote_ident(name)
            ),
            Self::CommentConstraint {
                table,
                name,
                comment,
            } => write!(
                f,
                "COMMENT ON CONSTRAINT {} ON {} IS {}",
                quote_ident(name),
                quote_ident(table),
                quote_literal(comment)
            ),
            Self::CreatePartition {
                parent,
                name,
                from,
                to,
            } => write!(
                f,
                "CREATE TABLE IF NOT EXISTS {} PARTITION OF {} FOR VALUES FROM ({}) TO ({})",
                quote_ident(name),
                quote_ident(parent),
                quote_literal(&from.to_string()),
                quote_literal(&to.to_string())
            ),
        }
    }
}
