//! Error types for the document store.

use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record is missing the field the store indexes by
    #[error("record has no string field '{0}' to index by")]
    MissingIndexField(String),

    /// Identity is not allowed to write
    #[error("identity {0} is not allowed to write to this store")]
    AccessDenied(String),

    /// Opening the store did not finish in time
    #[error("store open timed out after {0:?}")]
    Timeout(Duration),

    /// The store or replicator has been closed
    #[error("store is closed")]
    Closed,

    /// A background task failed
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
