//! Vacuum: physically delete data files that are no longer reachable
//! from any retained snapshot and whose tombstone has aged past a retention
//! window. A path is only ever removed once it has been `Remove`d and not
//! re-`Add`ed in a later commit — since every rewrite (compaction, update,
//! merge) writes a freshly generated file name, a removed path is never
//! legitimately referenced again.

use std::collections::HashMap;

use super::error::MaintenanceError;
use crate::log::action::Action;
use crate::log::commit::{latest_version, read_commit};
use crate::storage::Storage;

/// Default tombstone retention: seven days, matching Delta Lake's own
/// `VACUUM` default — long enough that a concurrent reader holding an older
/// snapshot open is very unlikely to still need a just-removed file.
pub const DEFAULT_RETENTION_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Replay the whole log to find paths that are currently tombstoned (removed
/// and never re-added) with a deletion timestamp older than `retention_millis`
/// relative to `now_millis`, then physically delete them. Returns the list
/// of paths actually deleted.
pub async fn vacuum(
    storage: &dyn Storage,
    log_dir: &str,
    base_dir: &str,
    retention_millis: i64,
    now_millis: i64,
) -> Result<Vec<String>, MaintenanceError> {
    let Some(latest) = latest_version(storage, log_dir).await? else {
        return Ok(Vec::new());
    };

    let mut tombstoned: HashMap<String, i64> = HashMap::new();
    for version in 0..=latest {
        for action in read_commit(storage, log_dir, version).await? {
            match action {
                Action::Add(add) => {
                    tombstoned.remove(&add.path);
                }
                Action::Remove(remove) => {
                    tombstoned.insert(remove.path, remove.deletion_timestamp_millis);
                }
                _ => {}
            }
        }
    }

    let mut deleted = Vec::new();
    for (path, deletion_timestamp_millis) in tombstoned {
        if now_millis - deletion_timestamp_millis >= retention_millis {
            let full_path = format!("{}/{}", base_dir.trim_end_matches('/'), path);
            storage.delete(&full_path).await?;
            deleted.push(path);
        }
    }
    deleted.sort();
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::action::{AddAction, RemoveAction};
    use crate::log::commit::commit_with_retry;
    use crate::retry::RetryPolicy;
    use crate::storage::memory::MemoryStorage;
    use std::collections::BTreeMap;

    fn add(path: &str, ts: i64) -> Action {
        Action::Add(AddAction {
            path: path.into(),
            partition_values: BTreeMap::new(),
            size_bytes: 10,
            modification_time_millis: ts,
            data_change: true,
            stats: None,
            deletion_vector: None,
        })
    }

    fn remove(path: &str, ts: i64) -> Action {
        Action::Remove(RemoveAction {
            path: path.into(),
            deletion_timestamp_millis: ts,
            data_change: true,
            partition_values: BTreeMap::new(),
            size_bytes: Some(10),
        })
    }

    #[tokio::test]
    async fn deletes_tombstones_past_retention() {
        let storage = MemoryStorage::new();
        storage.write("t/part-0.parquet", bytes::Bytes::from_static(b"x")).await.unwrap();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "t/_delta_log", 0, &policy, |_| vec![add("part-0.parquet", 0)])
            .await
            .unwrap();
        commit_with_retry(&storage, "t/_delta_log", 1, &policy, |_| vec![remove("part-0.parquet", 1_000)])
            .await
            .unwrap();

        let deleted = vacuum(&storage, "t/_delta_log", "t", DEFAULT_RETENTION_MILLIS, 1_000 + DEFAULT_RETENTION_MILLIS)
            .await
            .unwrap();
        assert_eq!(deleted, vec!["part-0.parquet".to_string()]);
        assert!(!storage.exists("t/part-0.parquet").await.unwrap());
    }

    #[tokio::test]
    async fn does_not_delete_before_retention_elapses() {
        let storage = MemoryStorage::new();
        storage.write("t/part-0.parquet", bytes::Bytes::from_static(b"x")).await.unwrap();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "t/_delta_log", 0, &policy, |_| vec![add("part-0.parquet", 0)])
            .await
            .unwrap();
        commit_with_retry(&storage, "t/_delta_log", 1, &policy, |_| vec![remove("part-0.parquet", 1_000)])
            .await
            .unwrap();

        let deleted = vacuum(&storage, "t/_delta_log", "t", DEFAULT_RETENTION_MILLIS, 1_000).await.unwrap();
        assert!(deleted.is_empty());
        assert!(storage.exists("t/part-0.parquet").await.unwrap());
    }

    #[tokio::test]
    async fn a_re_added_path_is_never_vacuumed() {
        let storage = MemoryStorage::new();
        storage.write("t/part-0.parquet", bytes::Bytes::from_static(b"x")).await.unwrap();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "t/_delta_log", 0, &policy, |_| vec![add("part-0.parquet", 0)])
            .await
            .unwrap();
        commit_with_retry(&storage, "t/_delta_log", 1, &policy, |_| vec![remove("part-0.parquet", 1_000)])
            .await
            .unwrap();
        commit_with_retry(&storage, "t/_delta_log", 2, &policy, |_| vec![add("part-0.parquet", 2_000)])
            .await
            .unwrap();

        let deleted = vacuum(&storage, "t/_delta_log", "t", DEFAULT_RETENTION_MILLIS, 10 * DEFAULT_RETENTION_MILLIS)
            .await
            .unwrap();
        assert!(deleted.is_empty());
    }
}
