//! Identity key migration across partitions
//!
//! Unique constraints on a partitioned table live once per partition. A
//! parent-level constraint cascades to every partition, but constraints
//! created directly on a partition (by older tooling, under generated names)
//! do not go away when the parent's key changes. Moving the key therefore
//! refuses up front when existing rows collide under the new key, drops every
//! old-key constraint by structure, verifies none is left, and only then adds
//! the new key at the parent.

use std::collections::BTreeSet;

use serde::Serialize;

use super::error::PartitionError;
use super::manager::PartitionManager;
use crate::data::ddl::{ConstraintDef, DdlStatement};
use crate::data::DataError;
use crate::domain::facts::identity_constraint_name;

const PARTITION_KEY: &str = "date";

/// What a propagation pass changed
#[derive(Debug, Clone, Serialize)]
pub struct PropagationReport {
    pub table: String,
    /// `relation.constraint` for every dropped old-key constraint
    pub dropped: Vec<String>,
    /// Name of the parent constraint added, `None` when it was already present
    pub added: Option<String>,
    pub partitions_checked: usize,
}

fn validate_keys(old_key: &[String], new_key: &[String]) -> Result<(), PartitionError> {
    for (label, key) in [("old", old_key), ("new", new_key)] {
        if key.is_empty() {
            return Err(PartitionError::InvalidKey(format!("{} key is empty", label)));
        }
        let distinct: BTreeSet<&String> = key.iter().collect();
        if distinct.len() != key.len() {
            return Err(PartitionError::InvalidKey(format!(
                "{} key repeats a column",
                label
            )));
        }
    }
    if ConstraintDef::unique(old_key).is_unique_on(new_key) {
        return Err(PartitionError::InvalidKey(
            "old and new key have the same columns".into(),
        ));
    }
    if !new_key.iter().any(|c| c == PARTITION_KEY) {
        return Err(PartitionError::InvalidKey(format!(
            "new key must include the partition key {}",
            PARTITION_KEY
        )));
    }
    Ok(())
}

impl PartitionManager {
    /// Replace the unique key `old_key` with `new_key` on the table and all
    /// of its partitions.
    ///
    /// Constraints are matched by column set, never by name. The new key is
    /// only added once no old-key constraint remains anywhere; rows that
    /// would collide under it are reported instead of added.
    pub async fn propagate_constraint(
        &self,
        table: &str,
        old_key: &[String],
        new_key: &[String],
        name: Option<&str>,
    ) -> Result<PropagationReport, PartitionError> {
        validate_keys(old_key, new_key)?;
        let _lock = self.store.acquire_migration_lock().await?;

        if !self.store.table_exists(table).await? {
            return Err(DataError::UnknownTable(table.to_string()).into());
        }
        let constraint_name = name
            .map(str::to_string)
            .unwrap_or_else(|| identity_constraint_name(table));
        let partitions = self.store.partitions(table).await?;

        let parent_has_new = self.has_key(table, new_key).await?;

        // The old key stays in place when the new one cannot be added
        if !parent_has_new {
            let duplicates = self
                .store
                .duplicate_identities(table, new_key, self.duplicate_report_limit)
                .await?;
            if !duplicates.is_empty() {
                tracing::warn!(
                    table,
                    duplicates = duplicates.len(),
                    "Existing rows collide under the new identity key"
                );
                return Err(PartitionError::DuplicateIdentities {
                    constraint: constraint_name,
                    duplicates,
                });
            }
        }

        let mut dropped = Vec::new();

        // Parent first: dropping it removes the copies it cascaded
        self.drop_old_key(table, old_key, &mut dropped).await?;
        for partition in &partitions {
            self.drop_old_key(&partition.name, old_key, &mut dropped).await?;
        }

        let mut leftovers = Vec::new();
        for relation in std::iter::once(table).chain(partitions.iter().map(|p| p.name.as_str())) {
            if self.has_key(relation, old_key).await? {
                leftovers.push(relation.to_string());
            }
        }
        if !leftovers.is_empty() {
            tracing::error!(table, partitions = ?leftovers, "Old identity key survived drop pass");
            return Err(PartitionError::ConflictingConstraint {
                partitions: leftovers,
            });
        }

        let added = if parent_has_new {
            None
        } else {
            self.add_new_key(table, new_key, &constraint_name).await?;
            Some(constraint_name)
        };

        let mut missing = Vec::new();
        for partition in &partitions {
            if !self.has_key(&partition.name, new_key).await? {
                missing.push(partition.name.clone());
            }
        }
        if !missing.is_empty() {
            tracing::error!(table, partitions = ?missing, "New identity key missing on partitions");
            return Err(PartitionError::IncompleteConstraint { partitions: missing });
        }

        let report = PropagationReport {
            table: table.to_string(),
            dropped,
            added,
            partitions_checked: partitions.len(),
        };
        self.audit.constraint_propagated(&report);
        Ok(report)
    }

    /// Drop this relation's own constraints over `old_key`; an already
    /// absent constraint counts as dropped
    async fn drop_old_key(
        &self,
        relation: &str,
        old_key: &[String],
        dropped: &mut Vec<String>,
    ) -> Result<(), PartitionError> {
        let constraints = self.store.constraints(relation).await?;
        for constraint in constraints
            .iter()
            .filter(|c| !c.inherited && c.definition.is_unique_on(old_key))
        {
            let statement = DdlStatement::DropConstraint {
                table: relation.to_string(),
                name: constraint.name.clone(),
            };
            match self.store.execute(&statement).await {
                Ok(()) => {}
                Err(e) if e.is_undefined_object() => {
                    tracing::debug!(relation, constraint = %constraint.name, "Constraint already gone");
                }
                Err(e) => return Err(e.into()),
            }
            tracing::info!(relation, constraint = %constraint.name, "Dropped old identity constraint");
            dropped.push(format!("{}.{}", relation, constraint.name));
        }
        Ok(())
    }

    async fn has_key(&self, relation: &str, key: &[String]) -> Result<bool, PartitionError> {
        Ok(self
            .store
            .constraints(relation)
            .await?
            .iter()
            .any(|c| c.definition.is_unique_on(key)))
    }

    async fn add_new_key(
        &self,
        table: &str,
        new_key: &[String],
        name: &str,
    ) -> Result<(), PartitionError> {
        let statement = DdlStatement::AddConstraint {
            table: table.to_string(),
            name: name.to_string(),
            definition: ConstraintDef::unique(new_key),
        };
        match self.store.execute(&statement).await {
            Ok(()) => Ok(()),
            // Rows arrived between the duplicate scan and the ALTER
            Err(e @ DataError::UniqueViolation { .. }) => {
                let duplicates = self
                    .store
                    .duplicate_identities(table, new_key, self.duplicate_report_limit)
                    .await?;
                if duplicates.is_empty() {
                    Err(e.into())
                } else {
                    Err(PartitionError::DuplicateIdentities {
                        constraint: name.to_string(),
                        duplicates,
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_validate_keys() {
        let old = key(&["region_id", "date", "metric_name"]);
        let new = key(&["region_id", "date", "metric_name", "data_source", "attributes"]);
        assert!(validate_keys(&old, &new).is_ok());
        assert!(validate_keys(&old, &key(&["metric_name", "date", "region_id"])).is_err());
        assert!(validate_keys(&old, &key(&["region_id", "metric_name"])).is_err());
        assert!(validate_keys(&key(&[]), &new).is_err());
        assert!(validate_keys(&old, &key(&["date", "date"])).is_err());
    }
}
