use thiserror::Error;

use crate::retry::Retryable;
use crate::storage::error::StorageError;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] crate::codec::error::CodecError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("malformed checkpoint entry: {0}")]
    CorruptEntry(String),

    #[error("no _last_checkpoint pointer found")]
    MissingPointer,
}

impl Retryable for CheckpointError {
    fn is_retryable(&self) -> bool {
        matches!(self, CheckpointError::Storage(e) if e.is_retryable())
    }
}
