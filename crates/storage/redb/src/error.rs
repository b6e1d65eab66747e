//! Datastore error types.

use std::path::PathBuf;

use bridge_storage::DecodeError;

/// Errors from datastore operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The engine could not be opened or created.
    #[error("failed to open database at {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: redb::DatabaseError,
    },

    /// The configured file name is not a single plain path component.
    #[error("invalid database file name {0:?}")]
    InvalidFileName(String),

    /// Engine error during a transaction.
    #[error("database error: {0}")]
    Engine(#[from] redb::Error),

    /// A stored row could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Result type for datastore operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl From<redb::TransactionError> for DatabaseError {
    fn from(err: redb::TransactionError) -> Self {
        DatabaseError::Engine(err.into())
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(err: redb::TableError) -> Self {
        DatabaseError::Engine(err.into())
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(err: redb::StorageError) -> Self {
        DatabaseError::Engine(err.into())
    }
}

impl From<redb::CommitError> for DatabaseError {
    fn from(err: redb::CommitError) -> Self {
        DatabaseError::Engine(err.into())
    }
}
