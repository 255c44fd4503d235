//! Migration errors
//!
//! Only fatal conditions live here. A single operation failing during
//! execution is reported in its [`OperationResult`](super::OperationResult),
//! not raised.

use thiserror::Error;

use crate::data::DataError;

#[derive(Error, Debug)]
pub enum MigrationError {
    /// Operation is malformed (empty name, no columns, unparseable batch)
    #[error("Invalid operation #{index}: {reason}")]
    InvalidOperation { index: usize, reason: String },

    /// Operation references a table that does not exist
    #[error("Operation #{index} references unknown table {table}")]
    UnknownTable { index: usize, table: String },

    /// Operation references a column that neither exists nor is added earlier in the batch
    #[error("Operation #{index} references unknown column {table}.{column}")]
    UnknownColumn {
        index: usize,
        table: String,
        column: String,
    },

    /// Could not acquire the migration lock
    #[error("Failed to acquire migration lock: {0}")]
    Lock(#[source] DataError),

    /// Store failed while reading schema for validation or rendering
    #[error(transparent)]
    Store(#[from] DataError),
}

impl MigrationError {
    /// Configuration errors are never retried; fix the batch instead
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperation { .. } | Self::UnknownTable { .. } | Self::UnknownColumn { .. }
        )
    }
}
