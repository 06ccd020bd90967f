//! Snapshot reconstruction: the logical view of a table at a given
//! version, computed by loading the nearest checkpoint at or below that
//! version and replaying every commit after it. Snapshots are plain
//! immutable values — nothing here is cached or mutated once built, so a
//! caller that wants cross-call consistency just holds on to the value.

use std::collections::BTreeMap;

use crate::checkpoint::{read_checkpoint, read_last_checkpoint, CheckpointError};
use crate::log::action::{Action, AddAction, CommitInfoAction, MetadataAction, ProtocolAction};
use crate::log::error::LogError;
use crate::log::{latest_version, read_commit};
use crate::row::Schema;
use crate::storage::Storage;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("table does not exist")]
    TableNotFound,
    #[error("version {requested} exceeds the latest committed version {latest}")]
    VersionTooNew { requested: u64, latest: u64 },
    #[error("reader's minReaderVersion {reader} is below table protocol's minReaderVersion {required}")]
    UnsupportedProtocol { reader: u32, required: u32 },
}

/// The reader protocol version this build implements. A table whose
/// `Protocol.minReaderVersion` exceeds this must be refused rather than
/// read partially.
pub const READER_VERSION: u32 = 1;

/// A table's reconstructed state at a specific version. Immutable once
/// built; queries that need a consistent view across multiple calls should
/// hold on to one value rather than re-resolving "latest" each time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: u64,
    pub timestamp_millis: i64,
    pub live_files: BTreeMap<String, AddAction>,
    pub metadata: Option<MetadataAction>,
    pub protocol: Option<ProtocolAction>,
}

impl Snapshot {
    /// The view of a table that has never had a successful commit: no
    /// files, no metadata, version 0 (overwritten by the caller once a
    /// real version is known).
    pub fn empty() -> Snapshot {
        Snapshot { version: 0, timestamp_millis: 0, live_files: BTreeMap::new(), metadata: None, protocol: None }
    }

    pub fn schema(&self) -> Option<Schema> {
        self.metadata.as_ref().and_then(|m| Schema::from_json_string(&m.schema_json).ok())
    }

    pub fn partition_columns(&self) -> &[String] {
        self.metadata.as_ref().map(|m| m.partition_columns.as_slice()).unwrap_or(&[])
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Protocol(p) => self.protocol = Some(p),
            Action::Metadata(m) => self.metadata = Some(m),
            Action::Add(a) => {
                self.live_files.insert(a.path.clone(), a);
            }
            Action::Remove(r) => {
                self.live_files.remove(&r.path);
            }
            Action::CommitInfo(_) => {}
        }
    }
}

/// Find the highest checkpoint at or below `version`, preferring the
/// `_last_checkpoint` pointer and falling back to a list-scan of the log
/// directory for a checkpoint that pointer doesn't (yet, or anymore)
/// reflect.
async fn find_checkpoint(
    storage: &dyn Storage,
    log_dir: &str,
    version: u64,
) -> Result<Option<(u64, u32)>, SnapshotError> {
    if let Some(pointer) = read_last_checkpoint(storage, log_dir).await? {
        if pointer.version <= version {
            return Ok(Some((pointer.version, pointer.parts.unwrap_or(1))));
        }
    }

    let entries = storage.list(log_dir).await?;
    let mut best: Option<(u64, u32)> = None;
    for entry in entries {
        let name = entry.rsplit('/').next().unwrap_or(&entry);
        let Some((cp_version, total)) = parse_checkpoint_name(name) else { continue };
        if cp_version <= version && best.map_or(true, |(b, _)| cp_version > b) {
            best = Some((cp_version, total));
        }
    }
    Ok(best)
}

fn parse_checkpoint_name(name: &str) -> Option<(u64, u32)> {
    let stem = name.strip_suffix(".parquet")?;
    let parts: Vec<&str> = stem.split('.').collect();
    // `<version>.checkpoint.<part>.<total>`
    if parts.len() != 4 || parts[1] != "checkpoint" {
        return None;
    }
    let version: u64 = parts[0].parse().ok()?;
    let total: u32 = parts[3].parse().ok()?;
    Some((version, total))
}

/// Reconstruct the table's state at `version`: load the nearest checkpoint
/// at or below it, then replay every commit strictly after the checkpoint
/// up to and including `version`.
pub async fn reconstruct(storage: &dyn Storage, log_dir: &str, version: u64) -> Result<Snapshot, SnapshotError> {
    let latest = latest_version(storage, log_dir).await?.ok_or(SnapshotError::TableNotFound)?;
    if version > latest {
        return Err(SnapshotError::VersionTooNew { requested: version, latest });
    }

    let checkpoint = find_checkpoint(storage, log_dir, version).await?;
    let (start_replay_from, mut snapshot) = match checkpoint {
        Some((cp_version, total)) => {
            let actions = read_checkpoint(storage, log_dir, cp_version, total).await?;
            let mut snap = Snapshot {
                version: cp_version,
                timestamp_millis: 0,
                live_files: BTreeMap::new(),
                metadata: None,
                protocol: None,
            };
            for action in actions {
                snap.apply(action);
            }
            (cp_version + 1, snap)
        }
        None => (
            0,
            Snapshot { version: 0, timestamp_millis: 0, live_files: BTreeMap::new(), metadata: None, protocol: None },
        ),
    };

    let mut last_commit_info: Option<CommitInfoAction> = None;
    for v in start_replay_from..=version {
        let actions = read_commit(storage, log_dir, v).await?;
        for action in actions {
            if let Action::CommitInfo(ref info) = action {
                last_commit_info = Some(info.clone());
            }
            snapshot.apply(action);
        }
        snapshot.version = v;
    }

    if let Some(protocol) = &snapshot.protocol {
        if protocol.min_reader_version > READER_VERSION {
            return Err(SnapshotError::UnsupportedProtocol {
                reader: READER_VERSION,
                required: protocol.min_reader_version,
            });
        }
    }

    snapshot.timestamp_millis = last_commit_info.map(|c| c.timestamp_millis).unwrap_or(0);
    Ok(snapshot)
}

/// The ordered list of `CommitInfo` entries, one per version, for `history()`.
pub async fn history(
    storage: &dyn Storage,
    log_dir: &str,
) -> Result<Vec<(u64, Option<CommitInfoAction>)>, SnapshotError> {
    let latest = match latest_version(storage, log_dir).await? {
        Some(v) => v,
        None => return Ok(Vec::new()),
    };
    let mut out = Vec::with_capacity(latest as usize + 1);
    for v in 0..=latest {
        let actions = read_commit(storage, log_dir, v).await?;
        let info = actions.into_iter().find_map(|a| match a {
            Action::CommitInfo(c) => Some(c),
            _ => None,
        });
        out.push((v, info));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::write_checkpoint;
    use crate::log::action::{AddAction, CommitInfoAction, MetadataAction, ProtocolAction, RemoveAction};
    use crate::log::commit_with_retry;
    use crate::retry::RetryPolicy;
    use crate::storage::memory::MemoryStorage;
    use std::collections::BTreeMap as Map;

    fn protocol() -> Action {
        Action::Protocol(ProtocolAction { min_reader_version: 1, min_writer_version: 1 })
    }

    fn metadata() -> Action {
        Action::Metadata(MetadataAction {
            id: "t1".into(),
            schema_json: "{}".into(),
            partition_columns: vec![],
            configuration: Map::new(),
            created_time_millis: 0,
        })
    }

    fn add(path: &str) -> Action {
        Action::Add(AddAction {
            path: path.into(),
            partition_values: Map::new(),
            size_bytes: 1,
            modification_time_millis: 0,
            data_change: true,
            stats: None,
            deletion_vector: None,
        })
    }

    #[tokio::test]
    async fn replays_log_from_scratch() {
        let storage = MemoryStorage::new();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "_delta_log", 0, &policy, |_| vec![protocol(), metadata(), add("p1.parquet")])
            .await
            .unwrap();
        commit_with_retry(&storage, "_delta_log", 1, &policy, |_| vec![add("p2.parquet")]).await.unwrap();

        let snap = reconstruct(&storage, "_delta_log", 1).await.unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.live_files.len(), 2);
        assert!(snap.metadata.is_some());
    }

    #[tokio::test]
    async fn time_travel_returns_older_view() {
        let storage = MemoryStorage::new();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "_delta_log", 0, &policy, |_| vec![protocol(), metadata(), add("p1.parquet")])
            .await
            .unwrap();
        commit_with_retry(&storage, "_delta_log", 1, &policy, |_| vec![add("p2.parquet")]).await.unwrap();

        let v0 = reconstruct(&storage, "_delta_log", 0).await.unwrap();
        assert_eq!(v0.live_files.len(), 1);
    }

    #[tokio::test]
    async fn remove_tombstones_an_earlier_add() {
        let storage = MemoryStorage::new();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "_delta_log", 0, &policy, |_| vec![protocol(), metadata(), add("p1.parquet")])
            .await
            .unwrap();
        commit_with_retry(&storage, "_delta_log", 1, &policy, |_| {
            vec![Action::Remove(RemoveAction {
                path: "p1.parquet".into(),
                deletion_timestamp_millis: 5,
                data_change: true,
                partition_values: Map::new(),
                size_bytes: None,
            })]
        })
        .await
        .unwrap();

        let snap = reconstruct(&storage, "_delta_log", 1).await.unwrap();
        assert!(snap.live_files.is_empty());
    }

    #[tokio::test]
    async fn reconstruction_uses_checkpoint_and_skips_replaying_superseded_log() {
        let storage = MemoryStorage::new();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "_delta_log", 0, &policy, |_| vec![protocol(), metadata(), add("p1.parquet")])
            .await
            .unwrap();
        commit_with_retry(&storage, "_delta_log", 1, &policy, |_| vec![add("p2.parquet")]).await.unwrap();

        let actions_at_1 = vec![protocol(), metadata(), add("p1.parquet"), add("p2.parquet")];
        let parts = write_checkpoint(&storage, "_delta_log", 1, &actions_at_1, 100).await.unwrap();
        crate::checkpoint::write_last_checkpoint(
            &storage,
            "_delta_log",
            &crate::checkpoint::LastCheckpoint {
                version: 1,
                size: actions_at_1.len() as u64,
                parts: Some(parts.len() as u32),
                size_in_bytes: None,
                num_of_add_files: Some(2),
            },
        )
        .await
        .unwrap();

        commit_with_retry(&storage, "_delta_log", 2, &policy, |_| vec![add("p3.parquet")]).await.unwrap();

        let snap = reconstruct(&storage, "_delta_log", 2).await.unwrap();
        assert_eq!(snap.live_files.len(), 3);
    }

    #[tokio::test]
    async fn protocol_above_reader_version_is_refused() {
        let storage = MemoryStorage::new();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "_delta_log", 0, &policy, |_| {
            vec![Action::Protocol(ProtocolAction { min_reader_version: 99, min_writer_version: 1 }), metadata()]
        })
        .await
        .unwrap();

        let err = reconstruct(&storage, "_delta_log", 0).await.unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedProtocol { .. }));
    }

    #[tokio::test]
    async fn history_returns_commit_info_per_version() {
        let storage = MemoryStorage::new();
        let policy = RetryPolicy::default();
        commit_with_retry(&storage, "_delta_log", 0, &policy, |_| {
            vec![
                protocol(),
                metadata(),
                Action::CommitInfo(CommitInfoAction {
                    timestamp_millis: 100,
                    operation: "WRITE".into(),
                    operation_parameters: Map::new(),
                    is_blind_append: Some(true),
                }),
            ]
        })
        .await
        .unwrap();

        let h = history(&storage, "_delta_log").await.unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].0, 0);
        assert_eq!(h[0].1.as_ref().unwrap().operation, "WRITE");
    }
}
