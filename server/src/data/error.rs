//! Unified error type for the data layer
//!
//! Backend errors are classified into the categories callers act on:
//! configuration (fix the request), conflict (remediate the data), transient
//! (safe to retry) and everything else.

use chrono::NaiveDate;
use thiserror::Error;

/// Unified error type for data layer operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Unclassified PostgreSQL error
    #[error("PostgreSQL error: {0}")]
    Database(#[source] sqlx::Error),

    /// Referenced table does not exist
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Referenced column does not exist
    #[error("Unknown column: {table}.{column}")]
    UnknownColumn { table: String, column: String },

    /// Object being created already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Object being dropped or altered does not exist
    #[error("Undefined object: {0}")]
    UndefinedObject(String),

    /// Write rejected by a unique constraint
    #[error("Unique violation on {constraint}: {detail}")]
    UniqueViolation { constraint: String, detail: String },

    /// No partition accepts the row's date
    #[error("No partition of {table} accepts date {date}")]
    NoPartition { table: String, date: NaiveDate },

    /// ON CONFLICT target has no matching unique constraint
    #[error("No unique constraint on {table} matches conflict target ({columns})")]
    MissingConflictTarget { table: String, columns: String },

    /// Statement rejected by the engine for a structural reason
    #[error("Statement rejected: {0}")]
    Rejected(String),

    /// Execution channel unavailable (connection, pool, timeout)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Connection-level failures; the same statement may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }

    /// The caller referenced something that is not there; retrying won't help
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownTable(_) | Self::UnknownColumn { .. } | Self::Config(_)
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_undefined_object(&self) -> bool {
        matches!(self, Self::UndefinedObject(_))
    }

    /// Short category label for reports
    pub fn category(&self) -> &'static str {
        if self.is_transient() {
            "transient"
        } else if self.is_configuration() {
            "configuration"
        } else {
            match self {
                Self::UniqueViolation { .. }
                | Self::AlreadyExists(_)
                | Self::MissingConflictTarget { .. } => "conflict",
                _ => "database",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_display() {
        let err = DataError::UniqueViolation {
            constraint: "market_time_series_identity_key".into(),
            detail: "Key (region_id)=(06037) already exists.".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unique violation on market_time_series_identity_key: Key (region_id)=(06037) already exists."
        );
        assert_eq!(err.category(), "conflict");
    }

    #[test]
    fn test_no_partition_display() {
        let err = DataError::NoPartition {
            table: "market_time_series".into(),
            date: NaiveDate::from_ymd_opt(2031, 2, 1).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "No partition of market_time_series accepts date 2031-02-01"
        );
    }

    #[test]
    fn test_classification() {
        assert!(DataError::Unavailable("pool timed out".into()).is_transient());
        assert!(DataError::UnknownTable("t".into()).is_configuration());
        assert!(!DataError::UnknownTable("t".into()).is_transient());
        assert_eq!(DataError::UnknownTable("t".into()).category(), "configuration");
        assert_eq!(DataError::Rejected("x".into()).category(), "database");
        assert!(DataError::AlreadyExists("idx".into()).is_already_exists());
        assert!(DataError::UndefinedObject("c".into()).is_undefined_object());
    }
}
