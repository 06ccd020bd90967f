//! Transaction log actions: `Protocol`, `Metadata`, `Add`, `Remove`,
//! `CommitInfo`. Each commit is an ordered sequence of these, appended as
//! one NDJSON line per action — the same single-key-per-line shape Delta
//! Lake's own `_delta_log` uses, so every line self-describes its action
//! type without a separate framing layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::LogError;
use crate::codec::deletion_vector::DeletionVectorDescriptor;
use crate::codec::zonemap::ZoneMap;
use crate::row::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolAction {
    pub min_reader_version: u32,
    pub min_writer_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataAction {
    pub id: String,
    pub schema_json: String,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
    pub created_time_millis: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAction {
    pub path: String,
    #[serde(default)]
    pub partition_values: BTreeMap<String, Option<String>>,
    pub size_bytes: u64,
    pub modification_time_millis: i64,
    pub data_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ZoneMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_vector: Option<DeletionVectorDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveAction {
    pub path: String,
    pub deletion_timestamp_millis: i64,
    pub data_change: bool,
    #[serde(default)]
    pub partition_values: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfoAction {
    pub timestamp_millis: i64,
    pub operation: String,
    #[serde(default)]
    pub operation_parameters: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blind_append: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Protocol(ProtocolAction),
    Metadata(MetadataAction),
    Add(AddAction),
    Remove(RemoveAction),
    CommitInfo(CommitInfoAction),
}

/// On-disk line shape: exactly one of these fields is present, naming the
/// action by its key the way `{"add": {...}}` does in a real Delta log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ActionLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<ProtocolAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<MetadataAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    add: Option<AddAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remove: Option<RemoveAction>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "commitInfo")]
    commit_info: Option<CommitInfoAction>,
}

impl From<&Action> for ActionLine {
    fn from(action: &Action) -> Self {
        let mut line = ActionLine::default();
        match action {
            Action::Protocol(p) => line.protocol = Some(p.clone()),
            Action::Metadata(m) => line.metadata = Some(m.clone()),
            Action::Add(a) => line.add = Some(a.clone()),
            Action::Remove(r) => line.remove = Some(r.clone()),
            Action::CommitInfo(c) => line.commit_info = Some(c.clone()),
        }
        line
    }
}

impl TryFrom<ActionLine> for Action {
    type Error = LogError;

    fn try_from(line: ActionLine) -> Result<Self, LogError> {
        if let Some(p) = line.protocol {
            return Ok(Action::Protocol(p));
        }
        if let Some(m) = line.metadata {
            return Ok(Action::Metadata(m));
        }
        if let Some(a) = line.add {
            return Ok(Action::Add(a));
        }
        if let Some(r) = line.remove {
            return Ok(Action::Remove(r));
        }
        if let Some(c) = line.commit_info {
            return Ok(Action::CommitInfo(c));
        }
        Err(LogError::CorruptEntry("log line names no recognized action".to_string()))
    }
}

/// Encode a sequence of actions as newline-delimited JSON, one action per line.
pub fn encode_actions(actions: &[Action]) -> Result<String, LogError> {
    let mut out = String::new();
    for action in actions {
        let line = ActionLine::from(action);
        out.push_str(&serde_json::to_string(&line)?);
        out.push('\n');
    }
    Ok(out)
}

/// Decode an NDJSON commit entry back into its ordered actions. Blank lines
/// (trailing newline, stray whitespace) are skipped; anything else that
/// fails to parse is a [`LogError::CorruptEntry`].
pub fn decode_actions(ndjson: &str) -> Result<Vec<Action>, LogError> {
    let mut actions = Vec::new();
    for line in ndjson.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: ActionLine = serde_json::from_str(trimmed)?;
        actions.push(Action::try_from(parsed)?);
    }
    Ok(actions)
}
