//! Migration execution

use std::collections::HashSet;
use std::sync::Arc;

use crate::data::SchemaStore;
use crate::data::ddl::DdlStatement;
use crate::domain::audit::AuditSink;

use super::batch::MigrationBatch;
use super::error::MigrationError;
use super::operation::MigrationOperation;
use super::plan::{Plan, plan_operation};
use super::result::{MigrationReport, OperationResult, OperationStatus};

/// Applies migration batches against a schema store
pub struct MigrationRunner {
    store: Arc<dyn SchemaStore>,
    audit: Arc<dyn AuditSink>,
}

impl MigrationRunner {
    pub fn new(store: Arc<dyn SchemaStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Statements `execute` would run right now, without running them
    pub async fn render(&self, batch: &MigrationBatch) -> Result<Vec<DdlStatement>, MigrationError> {
        self.validate(batch).await?;

        let mut statements = Vec::new();
        for operation in batch.operations() {
            match plan_operation(self.store.as_ref(), operation).await? {
                Plan::Pending(steps) => statements.extend(steps),
                Plan::Satisfied => {}
                Plan::Conflict(reason) => {
                    tracing::warn!(operation = %operation.describe(), %reason, "Operation would fail");
                }
            }
        }
        Ok(statements)
    }

    /// Apply a batch; one failed operation does not stop the rest.
    ///
    /// Malformed batches fail as a whole before any statement runs. Batches
    /// are serialized through the store's migration lock.
    pub async fn execute(&self, batch: &MigrationBatch) -> Result<MigrationReport, MigrationError> {
        let _lock = self
            .store
            .acquire_migration_lock()
            .await
            .map_err(MigrationError::Lock)?;

        self.validate(batch).await?;

        let checksum = batch.checksum();
        tracing::info!(
            batch = batch.name(),
            checksum = %checksum,
            operations = batch.len(),
            backend = self.store.backend_name(),
            "Executing migration batch"
        );

        let mut results = Vec::with_capacity(batch.len());
        for (index, operation) in batch.operations().iter().enumerate() {
            results.push(self.apply(index, operation).await);
        }

        let report = MigrationReport {
            batch: batch.name().to_string(),
            checksum,
            backend: self.store.backend_name().to_string(),
            results,
        };
        self.audit.migration_finished(&report);
        Ok(report)
    }

    /// Reject malformed operations and dangling table/column references.
    ///
    /// A column counts as present when it exists or an earlier operation in
    /// the batch adds it.
    async fn validate(&self, batch: &MigrationBatch) -> Result<(), MigrationError> {
        let mut added: HashSet<(&str, &str)> = HashSet::new();

        for (index, operation) in batch.operations().iter().enumerate() {
            operation
                .validate()
                .map_err(|reason| MigrationError::InvalidOperation { index, reason })?;

            let table = operation.table();
            if !self.store.table_exists(table).await? {
                return Err(MigrationError::UnknownTable {
                    index,
                    table: table.to_string(),
                });
            }

            for column in operation.referenced_columns() {
                if added.contains(&(table, column)) {
                    continue;
                }
                if self.store.column(table, column).await?.is_none() {
                    return Err(MigrationError::UnknownColumn {
                        index,
                        table: table.to_string(),
                        column: column.to_string(),
                    });
                }
            }

            if let MigrationOperation::AddColumn { column, .. } = operation {
                added.insert((table, column.as_str()));
            }
        }
        Ok(())
    }

    async fn apply(&self, index: usize, operation: &MigrationOperation) -> OperationResult {
        let label = operation.describe();
        let result = |status: OperationStatus, statements: Vec<String>| OperationResult {
            index,
            operation: label.clone(),
            status,
            statements,
        };

        let plan = match plan_operation(self.store.as_ref(), operation).await {
            Ok(plan) => plan,
            Err(e) => {
                return result(
                    OperationStatus::Failed {
                        reason: e.to_string(),
                        category: e.category().to_string(),
                    },
                    Vec::new(),
                );
            }
        };

        let steps = match plan {
            Plan::Satisfied => return result(OperationStatus::AlreadySatisfied, Vec::new()),
            Plan::Conflict(reason) => {
                return result(
                    OperationStatus::Failed {
                        reason,
                        category: "conflict".to_string(),
                    },
                    Vec::new(),
                );
            }
            Plan::Pending(steps) => steps,
        };

        let mut executed = Vec::with_capacity(steps.len());
        for step in &steps {
            if step.takes_exclusive_lock() {
                tracing::debug!(sql = %step, "Statement takes an exclusive table lock");
            }
            match self.store.execute(step).await {
                Ok(()) => executed.push(step.to_string()),
                // Someone else applied this step between planning and executing
                Err(e) if e.is_already_exists() => {
                    tracing::debug!(sql = %step, error = %e, "Step already applied");
                }
                Err(e) => {
                    tracing::warn!(
                        operation = %label,
                        sql = %step,
                        error = %e,
                        "Migration step failed"
                    );
                    return result(
                        OperationStatus::Failed {
                            reason: e.to_string(),
                            category: e.category().to_string(),
                        },
                        executed,
                    );
                }
            }
        }

        if executed.is_empty() {
            result(OperationStatus::AlreadySatisfied, executed)
        } else {
            result(OperationStatus::Applied, executed)
        }
    }
}
