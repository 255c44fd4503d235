//! Per-operation migration outcomes

use serde::Serialize;

/// Outcome of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationStatus {
    Applied,
    AlreadySatisfied,
    Failed {
        reason: String,
        /// `configuration`, `conflict`, `transient` or `database`
        category: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    /// Position in the batch
    pub index: usize,
    pub operation: String,
    #[serde(flatten)]
    pub status: OperationStatus,
    /// Statements that ran successfully for this operation
    pub statements: Vec<String>,
}

impl OperationResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, OperationStatus::Failed { .. })
    }
}

/// Result of executing a batch
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub batch: String,
    pub checksum: String,
    pub backend: String,
    pub results: Vec<OperationResult>,
}

impl MigrationReport {
    fn count(&self, pred: impl Fn(&OperationStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|s| *s == OperationStatus::Applied)
    }

    pub fn already_satisfied(&self) -> usize {
        self.count(|s| *s == OperationStatus::AlreadySatisfied)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, OperationStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Failed operations only, for selective re-invocation
    pub fn failures(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| r.is_failed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, status: OperationStatus) -> OperationResult {
        OperationResult {
            index,
            operation: format!("op {}", index),
            status,
            statements: vec![],
        }
    }

    #[test]
    fn test_counts() {
        let report = MigrationReport {
            batch: "b".into(),
            checksum: "c".into(),
            backend: "memory".into(),
            results: vec![
                result(0, OperationStatus::Applied),
                result(1, OperationStatus::AlreadySatisfied),
                result(
                    2,
                    OperationStatus::Failed {
                        reason: "down".into(),
                        category: "transient".into(),
                    },
                ),
            ],
        };
        assert_eq!(report.applied(), 1);
        assert_eq!(report.already_satisfied(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures().next().unwrap().index, 2);
    }

    #[test]
    fn test_status_serializes_flat() {
        let json = serde_json::to_value(result(
            0,
            OperationStatus::Failed {
                reason: "boom".into(),
                category: "database".into(),
            },
        ))
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}
