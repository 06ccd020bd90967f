//! Optimistic commit protocol: a writer reads the current version,
//! builds its actions, and attempts to create the next version's log file
//! with a CAS write that only succeeds if nobody else got there first. A
//! conflict means someone else committed that version already: the writer
//! advances to the next version and rebuilds its actions (so update/delete/
//! merge can recompute against the newer snapshot instead of blindly
//! replaying stale ones) and tries again, up to the policy's retry budget,
//! backing off between attempts the same way any other retrying call in
//! this crate does.

use bytes::Bytes;

use super::action::{decode_actions, encode_actions, Action};
use super::error::LogError;
use crate::codec::path::{commit_file_name, parse_commit_file_name};
use crate::retry::{with_retry, RetryPolicy};
use crate::storage::error::StorageError;
use crate::storage::Storage;

pub struct CommitResult {
    pub version: u64,
    pub actions: Vec<Action>,
}

fn join(log_dir: &str, name: &str) -> String {
    format!("{}/{}", log_dir.trim_end_matches('/'), name)
}

/// The highest committed version in `log_dir`, or `None` if the log is
/// empty (table not yet created).
pub async fn latest_version(storage: &dyn Storage, log_dir: &str) -> Result<Option<u64>, LogError> {
    let entries = storage.list(log_dir).await?;
    let mut max_version = None;
    for entry in entries {
        let name = entry.rsplit('/').next().unwrap_or(&entry);
        if let Some(v) = parse_commit_file_name(name) {
            max_version = Some(max_version.map_or(v, |m: u64| m.max(v)));
        }
    }
    Ok(max_version)
}

/// Read and decode one committed version's actions.
pub async fn read_commit(storage: &dyn Storage, log_dir: &str, version: u64) -> Result<Vec<Action>, LogError> {
    let path = join(log_dir, &commit_file_name(version));
    match storage.read(&path).await {
        Ok(bytes) => decode_actions(&String::from_utf8_lossy(&bytes)),
        Err(StorageError::FileNotFound(_)) => Err(LogError::VersionNotFound(version)),
        Err(e) => Err(e.into()),
    }
}

/// Attempt to commit, starting from `start_version`. `build_actions` is
/// called once per attempt with the version being targeted, so a caller
/// recomputing an update/delete/merge can base its rewritten actions on
/// whichever version the retry landed on.
pub async fn commit_with_retry(
    storage: &dyn Storage,
    log_dir: &str,
    start_version: u64,
    policy: &RetryPolicy,
    mut build_actions: impl FnMut(u64) -> Vec<Action>,
) -> Result<CommitResult, LogError> {
    let outcome = with_retry(
        policy,
        |attempt| {
            let version = start_version + attempt as u64;
            let actions = build_actions(version);
            async move {
                let ndjson = encode_actions(&actions)?;
                let path = join(log_dir, &commit_file_name(version));
                match storage.write_conditional(&path, Bytes::from(ndjson), None).await {
                    Ok(_) => Ok(CommitResult { version, actions }),
                    Err(StorageError::VersionMismatch { .. }) => Err(LogError::Conflict { version }),
                    Err(e) => Err(e.into()),
                }
            }
        },
        |delay| tokio::time::sleep(delay),
    )
    .await;

    outcome.map_err(|err| match err {
        LogError::Conflict { .. } => LogError::RetriesExhausted { attempts: policy.max_retries + 1 },
        other => other,
    })
}
