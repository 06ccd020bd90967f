//! Crash-recovery markers: a writer that crashes after
//! uploading data files but before the commit's conditional write lands
//! leaves orphaned blobs nobody's `Add` action ever references. A
//! [`PendingCommit`] marker, written before the data files and removed once
//! the commit succeeds, lets [`recover_orphaned_files`] find and clean up
//! exactly those orphans without touching anything a snapshot can still
//! reach.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::TableError;
use crate::snapshot::reconstruct;
use crate::storage::error::StorageError;
use crate::storage::Storage;

const PENDING_DIR: &str = "_pending";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCommit {
    pub marker_id: String,
    /// Data file paths (relative to the table base) this commit is about
    /// to write, before the commit's Add actions make them live.
    pub data_file_paths: Vec<String>,
}

fn marker_path(log_dir: &str, marker_id: &str) -> String {
    format!("{}/{PENDING_DIR}/{marker_id}.json", log_dir.trim_end_matches('/'))
}

/// Record intent to write `data_file_paths` before any of them is uploaded.
/// Returns the marker so the caller can pass its id to [`clear_pending`]
/// once the commit that makes those files live has succeeded.
pub async fn record_pending(
    storage: &dyn Storage,
    log_dir: &str,
    data_file_paths: Vec<String>,
) -> Result<PendingCommit, TableError> {
    let marker = PendingCommit { marker_id: Uuid::new_v4().to_string(), data_file_paths };
    let bytes = bytes::Bytes::from(serde_json::to_vec(&marker).expect("PendingCommit always serializes"));
    storage.write(&marker_path(log_dir, &marker.marker_id), bytes).await?;
    Ok(marker)
}

/// Remove a marker once its commit has either succeeded or been abandoned
/// cleanly (e.g. a validation error before any file was written).
pub async fn clear_pending(storage: &dyn Storage, log_dir: &str, marker_id: &str) -> Result<(), TableError> {
    storage.delete(&marker_path(log_dir, marker_id)).await?;
    Ok(())
}

/// Find every surviving marker, and for any whose listed paths are not all
/// live in the current snapshot, delete those files (idempotent — a path
/// the commit never actually got around to writing is simply absent) and
/// the marker itself. Returns the marker ids that were cleaned up.
pub async fn recover_orphaned_files(
    storage: &dyn Storage,
    log_dir: &str,
    base_dir: &str,
) -> Result<Vec<String>, TableError> {
    let prefix = format!("{}/{PENDING_DIR}/", log_dir.trim_end_matches('/'));
    let markers = match storage.list(&prefix).await {
        Ok(entries) => entries,
        Err(StorageError::FileNotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let live_files = match reconstruct_latest(storage, log_dir).await? {
        Some(snapshot) => snapshot,
        None => Default::default(),
    };

    let mut cleaned = Vec::new();
    for entry in markers {
        let bytes = match storage.read(&entry).await {
            Ok(b) => b,
            Err(StorageError::FileNotFound(_)) => continue,
            Err(e) => return Err(e.into()),
        };
        let marker: PendingCommit = serde_json::from_slice(&bytes)
            .map_err(|e| TableError::Validation(format!("corrupt pending-commit marker {entry}: {e}")))?;

        let all_landed = marker.data_file_paths.iter().all(|p| live_files.contains(p));
        if !all_landed {
            for path in &marker.data_file_paths {
                let full_path = format!("{}/{}", base_dir.trim_end_matches('/'), path);
                storage.delete(&full_path).await?;
            }
            tracing::warn!(marker = %marker.marker_id, "recovered orphaned files from an incomplete commit");
        }
        storage.delete(&entry).await?;
        cleaned.push(marker.marker_id);
    }
    Ok(cleaned)
}

async fn reconstruct_latest(
    storage: &dyn Storage,
    log_dir: &str,
) -> Result<Option<std::collections::BTreeSet<String>>, TableError> {
    let Some(latest) = crate::log::latest_version(storage, log_dir).await? else {
        return Ok(None);
    };
    let snapshot = reconstruct(storage, log_dir, latest).await?;
    Ok(Some(snapshot.live_files.into_keys().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::action::{Action, AddAction};
    use crate::log::commit_with_retry;
    use crate::retry::RetryPolicy;
    use crate::storage::memory::MemoryStorage;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn marker_cleared_after_successful_commit_leaves_nothing_to_recover() {
        let storage = MemoryStorage::new();
        storage.write("t/part-0.parquet", bytes::Bytes::from_static(b"x")).await.unwrap();
        let marker = record_pending(&storage, "t/_delta_log", vec!["part-0.parquet".into()]).await.unwrap();

        commit_with_retry(&storage, "t/_delta_log", 0, &RetryPolicy::default(), |_| {
            vec![Action::Add(AddAction {
                path: "part-0.parquet".into(),
                partition_values: BTreeMap::new(),
                size_bytes: 1,
                modification_time_millis: 0,
                data_change: true,
                stats: None,
                deletion_vector: None,
            })]
        })
        .await
        .unwrap();
        clear_pending(&storage, "t/_delta_log", &marker.marker_id).await.unwrap();

        let cleaned = recover_orphaned_files(&storage, "t/_delta_log", "t").await.unwrap();
        assert!(cleaned.is_empty());
        assert!(storage.exists("t/part-0.parquet").await.unwrap());
    }

    #[tokio::test]
    async fn crashed_write_leaves_an_orphan_that_recovery_deletes() {
        let storage = MemoryStorage::new();
        storage.write("t/part-orphan.parquet", bytes::Bytes::from_static(b"x")).await.unwrap();
        record_pending(&storage, "t/_delta_log", vec!["part-orphan.parquet".into()]).await.unwrap();
        // No commit ever references part-orphan.parquet — simulate a crash
        // between the file upload and the commit.
        commit_with_retry(&storage, "t/_delta_log", 0, &RetryPolicy::default(), |_| {
            vec![Action::Add(AddAction {
                path: "part-other.parquet".into(),
                partition_values: BTreeMap::new(),
                size_bytes: 1,
                modification_time_millis: 0,
                data_change: true,
                stats: None,
                deletion_vector: None,
            })]
        })
        .await
        .unwrap();

        let cleaned = recover_orphaned_files(&storage, "t/_delta_log", "t").await.unwrap();
        assert_eq!(cleaned.len(), 1);
        assert!(!storage.exists("t/part-orphan.parquet").await.unwrap());
    }
}
