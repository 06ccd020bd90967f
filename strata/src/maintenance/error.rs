use thiserror::Error;

use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum MaintenanceError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::error::StorageError),

    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::error::CodecError),

    #[error("transaction log error: {0}")]
    Log(#[from] crate::log::error::LogError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] crate::snapshot::SnapshotError),

    #[error("table has no schema to rewrite files against")]
    MissingSchema,
}

impl Retryable for MaintenanceError {
    fn is_retryable(&self) -> bool {
        match self {
            MaintenanceError::Storage(e) => e.is_retryable(),
            MaintenanceError::Log(e) => e.is_retryable(),
            _ => false,
        }
    }
}
