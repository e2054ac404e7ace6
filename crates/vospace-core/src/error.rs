//! Error types for the vospace-core crate

use thiserror::Error;
use vospace_storage::{PathError, StorageError};

/// Result type alias using `VoError`
pub type Result<T> = std::result::Result<T, VoError>;

/// Domain errors, one per response class of the transport layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoError {
    /// Address not stored when required
    #[error("{0}")]
    NotFound(String),

    /// Destination exists, copy into itself, or a forbidden structural change
    #[error("{0}")]
    Forbidden(String),

    /// Disallowed operation combination
    #[error("{0}")]
    BadRequest(String),

    /// Credentials rejected by the backend
    #[error("{0}")]
    PermissionDenied(String),

    /// Any other backend, transport or serialization failure
    #[error("{0}")]
    InternalServerError(String),
}

impl VoError {
    /// Error for capabilities the active metadata store does not offer
    pub fn unsupported() -> Self {
        VoError::InternalServerError("Unsupported".to_string())
    }

    pub fn node_not_found() -> Self {
        VoError::NotFound("NodeNotFound".to_string())
    }

    /// HTTP status the boundary layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            VoError::NotFound(_) => 404,
            VoError::Forbidden(_) => 403,
            VoError::BadRequest(_) => 400,
            VoError::PermissionDenied(_) => 401,
            VoError::InternalServerError(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            VoError::NotFound(m)
            | VoError::Forbidden(m)
            | VoError::BadRequest(m)
            | VoError::PermissionDenied(m)
            | VoError::InternalServerError(m) => m,
        }
    }
}

impl From<StorageError> for VoError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(m) => VoError::NotFound(m),
            StorageError::Unauthorized(m) => VoError::PermissionDenied(m),
            StorageError::BadRequest(m) => VoError::BadRequest(m),
            StorageError::InvalidPath(e) => VoError::BadRequest(e.to_string()),
            other => VoError::InternalServerError(other.to_string()),
        }
    }
}

impl From<PathError> for VoError {
    fn from(err: PathError) -> Self {
        VoError::BadRequest(err.to_string())
    }
}

impl From<serde_json::Error> for VoError {
    fn from(err: serde_json::Error) -> Self {
        VoError::InternalServerError(format!("Error generating JSON: {}", err))
    }
}

impl From<std::io::Error> for VoError {
    fn from(err: std::io::Error) -> Self {
        VoError::InternalServerError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_taxonomy() {
        let cases = [
            (StorageError::NotFound("x".into()), 404),
            (StorageError::Unauthorized("x".into()), 401),
            (StorageError::BadRequest("x".into()), 400),
            (StorageError::Timeout("x".into()), 500),
            (StorageError::Api("x".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(VoError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_json_errors_carry_cause() {
        let err: VoError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.message().starts_with("Error generating JSON: "));
        assert_eq!(err.status_code(), 500);
    }
}
