//! Diff one operation against the live schema

use crate::data::SchemaStore;
use crate::data::catalog::{ConstraintInfo, types_compatible};
use crate::data::ddl::DdlStatement;
use crate::data::error::DataError;
use crate::utils::sql::like_matches;

use super::operation::MigrationOperation;

/// What an operation still has to do
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Satisfied,
    Pending(Vec<DdlStatement>),
    /// The schema holds something incompatible that no statement here fixes
    Conflict(String),
}

impl Plan {
    fn from_steps(steps: Vec<DdlStatement>) -> Self {
        if steps.is_empty() {
            Self::Satisfied
        } else {
            Self::Pending(steps)
        }
    }
}

/// Read current structure and compute the remaining statements.
///
/// Always re-reads the catalog; two calls may disagree if someone else
/// changed the schema in between.
pub async fn plan_operation(
    store: &dyn SchemaStore,
    operation: &MigrationOperation,
) -> Result<Plan, DataError> {
    match operation {
        MigrationOperation::AddColumn {
            table,
            column,
            data_type,
            options,
        } => {
            let Some(existing) = store.column(table, column).await? else {
                return Ok(Plan::Pending(operation.statements()));
            };
            if !types_compatible(&existing.data_type, data_type) {
                return Ok(Plan::Conflict(format!(
                    "column {}.{} exists with type {}, requested {}",
                    table, column, existing.data_type, data_type
                )));
            }

            // Resume a partially applied add: default, backfill, then NOT NULL
            let tighten = options.not_null && existing.nullable;
            let mut steps = Vec::new();
            if let Some(default) = &options.default {
                if existing.default.is_none() {
                    steps.push(DdlStatement::SetDefault {
                        table: table.clone(),
                        column: column.clone(),
                        default: default.clone(),
                    });
                }
                if tighten {
                    steps.push(DdlStatement::BackfillDefault {
                        table: table.clone(),
                        column: column.clone(),
                        default: default.clone(),
                    });
                }
            }
            if tighten {
                steps.push(DdlStatement::SetNotNull {
                    table: table.clone(),
                    column: column.clone(),
                });
            }
            Ok(Plan::from_steps(steps))
        }

        MigrationOperation::CreateIndex { name, .. } => {
            if store.index_exists(name).await? {
                Ok(Plan::Satisfied)
            } else {
                Ok(Plan::Pending(operation.statements()))
            }
        }

        MigrationOperation::AddConstraint {
            name,
            table,
            definition,
            replaces,
        } => {
            let existing = store.constraints(table).await?;
            let present = existing.iter().any(|c| c.satisfies(definition));

            let is_stale = |c: &ConstraintInfo| {
                !c.inherited
                    && !c.satisfies(definition)
                    && (c.name == *name || replaces.iter().any(|p| like_matches(p, &c.name)))
            };
            let mut steps: Vec<DdlStatement> = existing
                .iter()
                .filter(|c| is_stale(*c))
                .map(|c| DdlStatement::DropConstraint {
                    table: table.clone(),
                    name: c.name.clone(),
                })
                .collect();

            if !present {
                steps.extend(operation.statements());
            }
            Ok(Plan::from_steps(steps))
        }
    }
}
