//! Translates log [`Action`]s to and from the flat row shape the checkpoint
//! Parquet file stores them in: one row per action, an `action_type`
//! discriminator column, and a `payload` column holding that action's own
//! JSON encoding. A checkpoint is read in full on every cold snapshot load,
//! so a compact per-type columnar layout buys little; this keeps the reader
//! and writer simple and keeps every action type's own serde impl as the
//! single source of truth for its shape.

use std::collections::BTreeMap;

use crate::log::action::{Action, AddAction, CommitInfoAction, MetadataAction, ProtocolAction, RemoveAction};
use crate::row::{DataType, Row, Schema, SchemaField, Value};

use super::error::CheckpointError;

pub fn schema() -> Schema {
    Schema {
        fields: vec![
            SchemaField { name: "action_type".into(), data_type: DataType::Utf8, nullable: false, column_id: None },
            SchemaField { name: "payload".into(), data_type: DataType::Utf8, nullable: false, column_id: None },
        ],
    }
}

pub fn action_to_row(action: &Action) -> Result<Row, CheckpointError> {
    let (action_type, payload) = match action {
        Action::Protocol(p) => ("protocol", serde_json::to_string(p)?),
        Action::Metadata(m) => ("metadata", serde_json::to_string(m)?),
        Action::Add(a) => ("add", serde_json::to_string(a)?),
        Action::Remove(r) => ("remove", serde_json::to_string(r)?),
        Action::CommitInfo(c) => ("commitInfo", serde_json::to_string(c)?),
    };
    let mut row: Row = BTreeMap::new();
    row.insert("action_type".into(), Value::String(action_type.to_string()));
    row.insert("payload".into(), Value::String(payload));
    Ok(row)
}

pub fn row_to_action(row: &Row) -> Result<Action, CheckpointError> {
    let action_type = row
        .get("action_type")
        .and_then(Value::as_str)
        .ok_or_else(|| CheckpointError::CorruptEntry("missing action_type".to_string()))?;
    let payload = row
        .get("payload")
        .and_then(Value::as_str)
        .ok_or_else(|| CheckpointError::CorruptEntry("missing payload".to_string()))?;

    Ok(match action_type {
        "protocol" => Action::Protocol(serde_json::from_str::<ProtocolAction>(payload)?),
        "metadata" => Action::Metadata(serde_json::from_str::<MetadataAction>(payload)?),
        "add" => Action::Add(serde_json::from_str::<AddAction>(payload)?),
        "remove" => Action::Remove(serde_json::from_str::<RemoveAction>(payload)?),
        "commitInfo" => Action::CommitInfo(serde_json::from_str::<CommitInfoAction>(payload)?),
        other => return Err(CheckpointError::CorruptEntry(format!("unknown action_type {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_add_action_through_row() {
        let action = Action::Add(AddAction {
            path: "part-0.parquet".into(),
            partition_values: BTreeMap::new(),
            size_bytes: 10,
            modification_time_millis: 1,
            data_change: true,
            stats: None,
            deletion_vector: None,
        });
        let row = action_to_row(&action).unwrap();
        assert_eq!(row_to_action(&row).unwrap(), action);
    }
}
