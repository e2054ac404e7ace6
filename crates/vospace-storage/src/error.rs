//! Error types for the vospace-storage crate

use crate::path::PathError;
use thiserror::Error;

/// Result type alias using `StorageError`
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by object storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    /// Container or object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials rejected by the backend
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Operation combination the backend refuses
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Malformed node path
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// Unexpected backend API response
    #[error("storage API error: {0}")]
    Api(String),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout(err.to_string())
        } else if err.is_connect() {
            StorageError::Connection(err.to_string())
        } else if err.is_decode() {
            StorageError::Serialization(err.to_string())
        } else {
            StorageError::Api(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
