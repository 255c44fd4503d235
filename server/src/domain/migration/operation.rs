//! Declarative migration operations

use serde::{Deserialize, Serialize};

use crate::data::ddl::{ConstraintDef, DdlStatement};

/// Options for an added column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOptions {
    #[serde(default)]
    pub not_null: bool,
    /// SQL expression, e.g. `'unknown'` or `'{}'::jsonb`
    #[serde(default)]
    pub default: Option<String>,
}

impl ColumnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}

/// One structural change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationOperation {
    AddColumn {
        table: String,
        column: String,
        #[serde(rename = "type")]
        data_type: String,
        #[serde(flatten)]
        options: ColumnOptions,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    /// Add a constraint, dropping any earlier version of it first.
    ///
    /// An earlier version is an existing constraint with a different
    /// definition whose name equals `name` or matches one of the `replaces`
    /// LIKE patterns.
    AddConstraint {
        name: String,
        table: String,
        definition: ConstraintDef,
        #[serde(default)]
        replaces: Vec<String>,
    },
}

impl MigrationOperation {
    pub fn table(&self) -> &str {
        match self {
            Self::AddColumn { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::AddConstraint { table, .. } => table,
        }
    }

    /// Short human-readable label used in reports
    pub fn describe(&self) -> String {
        match self {
            Self::AddColumn { table, column, .. } => format!("add column {}.{}", table, column),
            Self::CreateIndex { name, table, .. } => format!("create index {} on {}", name, table),
            Self::AddConstraint { name, table, .. } => {
                format!("add constraint {} on {}", name, table)
            }
        }
    }

    /// Columns that must exist before this operation runs
    pub fn referenced_columns(&self) -> Vec<&str> {
        match self {
            Self::AddColumn { .. } => Vec::new(),
            Self::CreateIndex { columns, .. } => columns.iter().map(String::as_str).collect(),
            Self::AddConstraint { definition, .. } => definition
                .unique_columns()
                .map(|cols| cols.iter().map(String::as_str).collect())
                .unwrap_or_default(),
        }
    }

    /// Statements for a schema where nothing of this operation exists yet
    pub fn statements(&self) -> Vec<DdlStatement> {
        match self {
            Self::AddColumn {
                table,
                column,
                data_type,
                options,
            } => {
                // ADD COLUMN ... DEFAULT fills existing rows, so NOT NULL can follow
                let mut statements = vec![DdlStatement::AddColumn {
                    table: table.clone(),
                    column: column.clone(),
                    data_type: data_type.clone(),
                    default: options.default.clone(),
                }];
                if options.not_null {
                    statements.push(DdlStatement::SetNotNull {
                        table: table.clone(),
                        column: column.clone(),
                    });
                }
                statements
            }
            Self::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => vec![DdlStatement::CreateIndex {
                name: name.clone(),
                table: table.clone(),
                columns: columns.clone(),
                unique: *unique,
            }],
            Self::AddConstraint {
                name,
                table,
                definition,
                ..
            } => {
                let mut statements = vec![DdlStatement::AddConstraint {
                    table: table.clone(),
                    name: name.clone(),
                    definition: definition.clone(),
                }];
                if let ConstraintDef::Check { expression } = definition {
                    statements.push(DdlStatement::CommentConstraint {
                        table: table.clone(),
                        name: name.clone(),
                        comment: expression.clone(),
                    });
                }
                statements
            }
        }
    }

    /// Structural self-check, independent of the live schema
    pub fn validate(&self) -> Result<(), String> {
        let blank = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(format!("{} must not be empty", field))
            } else {
                Ok(())
            }
        };
        blank("table", self.table())?;

        match self {
            Self::AddColumn {
                column, data_type, ..
            } => {
                blank("column", column)?;
                blank("type", data_type)
            }
            Self::CreateIndex { name, columns, .. } => {
                blank("index name", name)?;
                if columns.is_empty() {
                    return Err("index needs at least one column".into());
                }
                Ok(())
            }
            Self::AddConstraint {
                name,
                definition,
                replaces,
                ..
            } => {
                blank("constraint name", name)?;
                if replaces.iter().any(|p| p.is_empty()) {
                    return Err("replacement patterns must not be empty".into());
                }
                match definition {
                    ConstraintDef::Unique { columns } if columns.is_empty() => {
                        Err("unique constraint needs at least one column".into())
                    }
                    ConstraintDef::Check { expression } => blank("check expression", expression),
                    ConstraintDef::Unique { .. } => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_add_column() {
        let op: MigrationOperation = serde_json::from_value(json!({
            "op": "add_column",
            "table": "market_time_series",
            "column": "data_source",
            "type": "text",
            "not_null": true,
            "default": "'unknown'"
        }))
        .unwrap();
        assert_eq!(
            op,
            MigrationOperation::AddColumn {
                table: "market_time_series".into(),
                column: "data_source".into(),
                data_type: "text".into(),
                options: ColumnOptions::new().not_null().default_value("'unknown'"),
            }
        );
    }

    #[test]
    fn test_deserialize_constraint_with_patterns() {
        let op: MigrationOperation = serde_json::from_value(json!({
            "op": "add_constraint",
            "table": "market_time_series",
            "name": "market_time_series_identity_key",
            "definition": {"kind": "unique", "columns": ["region_id", "date"]},
            "replaces": ["market_time_series_%_key"]
        }))
        .unwrap();
        assert_eq!(op.referenced_columns(), vec!["region_id", "date"]);
        assert_eq!(
            op.describe(),
            "add constraint market_time_series_identity_key on market_time_series"
        );
    }

    #[test]
    fn test_add_column_statements_order() {
        let op = MigrationOperation::AddColumn {
            table: "t".into(),
            column: "c".into(),
            data_type: "text".into(),
            options: ColumnOptions::new().not_null().default_value("'x'"),
        };
        let rendered: Vec<String> = op.statements().iter().map(|s| s.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "ALTER TABLE \"t\" ADD COLUMN \"c\" text DEFAULT 'x'",
                "ALTER TABLE \"t\" ALTER COLUMN \"c\" SET NOT NULL",
            ]
        );
    }

    #[test]
    fn test_validate() {
        let op = MigrationOperation::CreateIndex {
            name: "idx".into(),
            table: "t".into(),
            columns: vec![],
            unique: false,
        };
        assert_eq!(op.validate().unwrap_err(), "index needs at least one column");

        let op = MigrationOperation::AddConstraint {
            name: " ".into(),
            table: "t".into(),
            definition: ConstraintDef::unique(&["a"]),
            replaces: vec![],
        };
        assert_eq!(op.validate().unwrap_err(), "constraint name must not be empty");
    }
}
