//! The `_last_checkpoint` pointer: a small JSON file recording
//! where the most recent checkpoint lives, so a snapshot load can skip
//! straight to it instead of list-scanning the whole log directory.
//! Written last, and unconditionally — by the time it's written, version
//! K's checkpoint parts are already durable, so there is nothing for a CAS
//! to protect here.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::CheckpointError;
use crate::storage::error::StorageError;
use crate::storage::Storage;

const POINTER_NAME: &str = "_last_checkpoint";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastCheckpoint {
    pub version: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "sizeInBytes")]
    pub size_in_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "numOfAddFiles")]
    pub num_of_add_files: Option<u64>,
}

fn pointer_path(log_dir: &str) -> String {
    format!("{}/{}", log_dir.trim_end_matches('/'), POINTER_NAME)
}

pub async fn read_last_checkpoint(
    storage: &dyn Storage,
    log_dir: &str,
) -> Result<Option<LastCheckpoint>, CheckpointError> {
    match storage.read(&pointer_path(log_dir)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(StorageError::FileNotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn write_last_checkpoint(
    storage: &dyn Storage,
    log_dir: &str,
    pointer: &LastCheckpoint,
) -> Result<(), CheckpointError> {
    let bytes = Bytes::from(serde_json::to_vec(pointer)?);
    storage.write(&pointer_path(log_dir), bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[tokio::test]
    async fn missing_pointer_reads_as_none() {
        let storage = MemoryStorage::new();
        assert_eq!(read_last_checkpoint(&storage, "_delta_log").await.unwrap(), None);
    }

    #[tokio::test]
    async fn round_trips_pointer() {
        let storage = MemoryStorage::new();
        let pointer = LastCheckpoint { version: 10, size: 3, parts: Some(3), size_in_bytes: Some(4096), num_of_add_files: Some(7) };
        write_last_checkpoint(&storage, "_delta_log", &pointer).await.unwrap();
        let read = read_last_checkpoint(&storage, "_delta_log").await.unwrap();
        assert_eq!(read, Some(pointer));
    }
}
