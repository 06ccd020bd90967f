//! CDC record shape: one row per logical change, version-aligned to
//! the commit that produced it.

use serde::{Deserialize, Serialize};

use crate::row::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Insert,
    UpdatePreimage,
    UpdatePostimage,
    Delete,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Insert => "insert",
            ChangeType::UpdatePreimage => "update_preimage",
            ChangeType::UpdatePostimage => "update_postimage",
            ChangeType::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Option<ChangeType> {
        match s {
            "insert" => Some(ChangeType::Insert),
            "update_preimage" => Some(ChangeType::UpdatePreimage),
            "update_postimage" => Some(ChangeType::UpdatePostimage),
            "delete" => Some(ChangeType::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub change_type: ChangeType,
    pub commit_version: u64,
    pub commit_timestamp_millis: i64,
    pub data: Row,
}
