//! PostgreSQL error classification
//!
//! Maps SQLSTATE codes onto [`DataError`] categories.

use sqlx::postgres::PgDatabaseError;

use crate::data::error::DataError;

pub const UNIQUE_VIOLATION: &str = "23505";
pub const CHECK_VIOLATION: &str = "23514";
pub const UNDEFINED_TABLE: &str = "42P01";
pub const UNDEFINED_COLUMN: &str = "42703";
pub const UNDEFINED_OBJECT: &str = "42704";
pub const DUPLICATE_TABLE: &str = "42P07";
pub const DUPLICATE_COLUMN: &str = "42701";
pub const DUPLICATE_OBJECT: &str = "42710";
pub const INVALID_COLUMN_REFERENCE: &str = "42P10";
pub const QUERY_CANCELED: &str = "57014";
pub const TOO_MANY_CONNECTIONS: &str = "53300";

/// Convert a sqlx error into the data layer's error taxonomy
pub fn classify(err: sqlx::Error) -> DataError {
    match classify_ref(&err) {
        Some(mapped) => mapped,
        None => DataError::Database(err),
    }
}

fn classify_ref(err: &sqlx::Error) -> Option<DataError> {
    match err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            let message = db.message().to_string();
            let mapped = match code.as_str() {
                UNDEFINED_TABLE => DataError::UnknownTable(message),
                UNDEFINED_COLUMN => DataError::Config(message),
                DUPLICATE_TABLE | DUPLICATE_COLUMN | DUPLICATE_OBJECT => {
                    DataError::AlreadyExists(message)
                }
                UNDEFINED_OBJECT => DataError::UndefinedObject(message),
                UNIQUE_VIOLATION => DataError::UniqueViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                    detail: db
                        .try_downcast_ref::<PgDatabaseError>()
                        .and_then(|pg| pg.detail())
                        .map(str::to_string)
                        .unwrap_or(message),
                },
                INVALID_COLUMN_REFERENCE => DataError::MissingConflictTarget {
                    table: db.table().unwrap_or("unknown").to_string(),
                    columns: message,
                },
                QUERY_CANCELED | TOO_MANY_CONNECTIONS => DataError::Unavailable(message),
                c if c.starts_with("08") || c.starts_with("57P") => {
                    DataError::Unavailable(message)
                }
                _ => return None,
            };
            Some(mapped)
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Some(DataError::Unavailable(err.to_string())),
        _ => None,
    }
}

/// SQLSTATE of a database error, if any
pub fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}
