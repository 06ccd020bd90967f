//! Pre-checkpoint log cleanup: once a checkpoint at version `K`
//! exists, commit files strictly below `K` are redundant for snapshot
//! reconstruction (the checkpoint already contains their cumulative
//! effect) and may be deleted once they've aged past a retention window.
//! A reader already holding a snapshot older than the cleaned range simply
//! experiences a read-after-delete on its next replay and must restart
//! against a current snapshot — this module only decides *what* is safe to
//! delete, not how callers recover from racing a cleanup.

use super::error::CheckpointError;
use crate::codec::path::{commit_file_name, parse_commit_file_name};
use crate::storage::Storage;

/// Versions strictly below `checkpoint_version` whose commit file's
/// `last_modified` is older than `now_millis - retention_millis`, in
/// ascending order (the order the spec requires deletions to proceed in).
pub async fn cleanable_versions(
    storage: &dyn Storage,
    log_dir: &str,
    checkpoint_version: u64,
    retention_millis: i64,
    now_millis: i64,
) -> Result<Vec<u64>, CheckpointError> {
    let entries = storage.list(log_dir).await?;
    let mut cleanable = Vec::new();

    for entry in entries {
        let name = entry.rsplit('/').next().unwrap_or(&entry);
        let Some(version) = parse_commit_file_name(name) else { continue };
        if version >= checkpoint_version {
            continue;
        }
        if let Some(stat) = storage.stat(&entry).await? {
            if now_millis.saturating_sub(stat.last_modified_millis) >= retention_millis {
                cleanable.push(version);
            }
        }
    }

    cleanable.sort_unstable();
    Ok(cleanable)
}

/// Delete the given versions' commit files, in the order given (ascending,
/// per the caller's contract), stopping at the first storage error rather
/// than skipping ahead.
pub async fn delete_versions(storage: &dyn Storage, log_dir: &str, versions: &[u64]) -> Result<(), CheckpointError> {
    for &version in versions {
        let path = format!("{}/{}", log_dir.trim_end_matches('/'), commit_file_name(version));
        storage.delete(&path).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use bytes::Bytes;

    #[tokio::test]
    async fn only_versions_below_checkpoint_and_past_retention_are_cleanable() {
        let storage = MemoryStorage::new();
        for v in 0..5u64 {
            storage.write(&format!("_delta_log/{}", commit_file_name(v)), Bytes::from_static(b"{}")).await.unwrap();
        }
        // All files were "modified" at mtime 0 under the memory backend's stat (no real clock),
        // so with a huge retention window nothing is cleanable yet.
        let none = cleanable_versions(&storage, "_delta_log", 3, i64::MAX, 0).await.unwrap();
        assert!(none.is_empty());

        // With a retention window satisfied (now far in the future), versions below
        // the checkpoint (3) are cleanable; 3 and 4 are not.
        let cleanable = cleanable_versions(&storage, "_delta_log", 3, 0, i64::MAX).await.unwrap();
        assert_eq!(cleanable, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn delete_versions_removes_commit_files() {
        let storage = MemoryStorage::new();
        for v in 0..3u64 {
            storage.write(&format!("_delta_log/{}", commit_file_name(v)), Bytes::from_static(b"{}")).await.unwrap();
        }
        delete_versions(&storage, "_delta_log", &[0, 1]).await.unwrap();
        assert!(!storage.exists(&format!("_delta_log/{}", commit_file_name(0))).await.unwrap());
        assert!(storage.exists(&format!("_delta_log/{}", commit_file_name(2))).await.unwrap());
    }
}
