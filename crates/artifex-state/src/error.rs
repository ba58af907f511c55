//! Error types for artifex-state

use thiserror::Error;

/// Errors from object storage, persistence and the artifact cache.
///
/// `Clone` so one upload outcome can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Keys must be relative and must not escape the store root.
    #[error("invalid object key: {key}")]
    InvalidKey { key: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("upload of {hash} ended without a result")]
    UploadAbandoned { hash: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;
