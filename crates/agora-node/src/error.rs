//! Error types for Agora nodes.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Error from the document store, passed through unchanged
    #[error(transparent)]
    Store(#[from] agora_store::Error),

    /// Record could not be decoded into a document
    #[error("Undecodable record: {0}")]
    Decode(#[from] crate::models::DecodeError),

    /// Document failed validation
    #[error("Invalid document: {0}")]
    Validation(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// No store is open for the session
    #[error("Replica is not ready")]
    NotReady,

    /// The session was disconnected while connecting
    #[error("Session was cancelled")]
    Cancelled,

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
