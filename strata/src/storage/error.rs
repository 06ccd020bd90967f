//! Storage-layer errors.

use thiserror::Error;

use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("path not found: {0}")]
    FileNotFound(String),

    #[error("conditional write failed on {path}: expected version {expected:?}, actual {actual:?}")]
    VersionMismatch {
        path: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("storage temporarily unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("unrecognized storage URL: {0}")]
    UnrecognizedUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl StorageError {
    pub fn version_mismatch(
        path: impl Into<String>,
        expected: Option<String>,
        actual: Option<String>,
    ) -> Self {
        StorageError::VersionMismatch {
            path: path.into(),
            expected,
            actual,
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        matches!(self, StorageError::ServiceUnavailable(_))
    }
}
