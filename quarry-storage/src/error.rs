//! Error types for the storage layer.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// The backend rejected a write (NOT NULL, UNIQUE, FOREIGN KEY).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Row not found.
    #[error("row not found: {0}")]
    NotFound(String),

    /// A concurrent writer got there first, or the database is locked.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Table was never created.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Transaction misuse (commit without begin, unknown savepoint, ...).
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg) if code.code == ErrorCode::ConstraintViolation => {
                Self::ConstraintViolation(msg.unwrap_or_else(|| code.to_string()))
            }
            rusqlite::Error::SqliteFailure(code, msg)
                if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::Conflict(msg.unwrap_or_else(|| code.to_string()))
            }
            other => Self::Database(other),
        }
    }
}
