use thiserror::Error;

use crate::retry::Retryable;
use crate::storage::error::StorageError;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("malformed log entry: {0}")]
    CorruptEntry(String),

    #[error(transparent)]
    Codec(#[from] serde_json::Error),

    #[error("commit conflict at version {version}: another writer already committed it")]
    Conflict { version: u64 },

    #[error("version {0} not found in the transaction log")]
    VersionNotFound(u64),

    #[error("exhausted {attempts} commit retries")]
    RetriesExhausted { attempts: u32 },
}

impl LogError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, LogError::Conflict { .. })
    }
}

impl Retryable for LogError {
    fn is_retryable(&self) -> bool {
        match self {
            LogError::Conflict { .. } => true,
            LogError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}
