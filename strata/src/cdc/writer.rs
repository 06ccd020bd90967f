//! CDC file emission: each commit's change records are written to
//! both a flat file and a date-partitioned mirror; if the partitioned
//! write fails, the flat file is deleted so a reader never observes one
//! without the other.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::error::CdcError;
use super::record::{ChangeRecord, ChangeType};
use crate::codec::columnar::ColumnarWriter;
use crate::codec::path::format_version;
use crate::row::{DataType, Row, Schema, SchemaField, Value};
use crate::storage::Storage;

pub const CDC_DIR: &str = "_change_data";

pub fn schema() -> Schema {
    Schema {
        fields: vec![
            SchemaField { name: "_change_type".into(), data_type: DataType::Utf8, nullable: false, column_id: None },
            SchemaField { name: "_commit_version".into(), data_type: DataType::Int64, nullable: false, column_id: None },
            SchemaField {
                name: "_commit_timestamp_millis".into(),
                data_type: DataType::Int64,
                nullable: false,
                column_id: None,
            },
            SchemaField { name: "data".into(), data_type: DataType::Binary, nullable: false, column_id: None },
        ],
    }
}

fn record_to_row(record: &ChangeRecord) -> Row {
    let mut row = Row::new();
    row.insert("_change_type".into(), Value::String(record.change_type.as_str().to_string()));
    row.insert("_commit_version".into(), Value::Int(record.commit_version as i64));
    row.insert("_commit_timestamp_millis".into(), Value::Int(record.commit_timestamp_millis));
    row.insert("data".into(), Value::Object(record.data.clone()));
    row
}

pub(crate) fn row_to_record(row: &Row) -> Result<ChangeRecord, CdcError> {
    let change_type = row
        .get("_change_type")
        .and_then(Value::as_str)
        .and_then(ChangeType::from_str)
        .ok_or_else(|| CdcError::Parse { path: String::new(), reason: "missing or unknown _change_type".into() })?;
    let commit_version = row
        .get("_commit_version")
        .and_then(Value::as_i64)
        .ok_or_else(|| CdcError::Parse { path: String::new(), reason: "missing _commit_version".into() })?
        as u64;
    let commit_timestamp_millis = row
        .get("_commit_timestamp_millis")
        .and_then(Value::as_i64)
        .ok_or_else(|| CdcError::Parse { path: String::new(), reason: "missing _commit_timestamp_millis".into() })?;
    let data = match row.get("data") {
        Some(Value::Object(map)) => map.clone(),
        _ => return Err(CdcError::Parse { path: String::new(), reason: "missing data object".into() }),
    };
    Ok(ChangeRecord { change_type, commit_version, commit_timestamp_millis, data })
}

fn date_prefix(commit_timestamp_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(commit_timestamp_millis)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap())
        .format("%Y-%m-%d")
        .to_string()
}

fn flat_path(base_dir: &str, version: u64) -> String {
    format!("{}/{CDC_DIR}/cdc-{}.parquet", base_dir.trim_end_matches('/'), format_version(version))
}

fn partitioned_path(base_dir: &str, version: u64, commit_timestamp_millis: i64) -> String {
    format!(
        "{}/{CDC_DIR}/date={}/cdc-{}.parquet",
        base_dir.trim_end_matches('/'),
        date_prefix(commit_timestamp_millis),
        format_version(version)
    )
}

/// Encode and write `records` (all belonging to the same commit `version`)
/// to both the flat and date-partitioned CDC paths. Fails with
/// [`CdcError::EmptyWrite`] if `records` is empty — there is nothing
/// version-aligned to emit.
pub async fn write_cdc_file(
    storage: &dyn Storage,
    base_dir: &str,
    version: u64,
    commit_timestamp_millis: i64,
    records: &[ChangeRecord],
) -> Result<(), CdcError> {
    if records.is_empty() {
        return Err(CdcError::EmptyWrite);
    }

    let row_schema = schema();
    let mut writer = ColumnarWriter::try_new(&row_schema).map_err(|e| CdcError::Parse { path: String::new(), reason: e.to_string() })?;
    let rows: Vec<Row> = records.iter().map(record_to_row).collect();
    writer.write_rows(&rows).map_err(|e| CdcError::Parse { path: String::new(), reason: e.to_string() })?;
    let (bytes, _zone_map) = writer.finish().map_err(|e| CdcError::Parse { path: String::new(), reason: e.to_string() })?;

    let flat = flat_path(base_dir, version);
    storage.write(&flat, Bytes::from(bytes.clone())).await?;

    let partitioned = partitioned_path(base_dir, version, commit_timestamp_millis);
    if let Err(e) = storage.write(&partitioned, Bytes::from(bytes)).await {
        tracing::warn!(error = %e, version, "partitioned CDC write failed, rolling back flat file");
        storage.delete(&flat).await?;
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use std::collections::BTreeMap;

    fn record(change_type: ChangeType) -> ChangeRecord {
        let mut data = BTreeMap::new();
        data.insert("id".to_string(), Value::Int(1));
        ChangeRecord { change_type, commit_version: 3, commit_timestamp_millis: 1_700_000_000_000, data }
    }

    #[tokio::test]
    async fn writes_flat_and_partitioned_mirror() {
        let storage = MemoryStorage::new();
        write_cdc_file(&storage, "t", 3, 1_700_000_000_000, &[record(ChangeType::Insert)]).await.unwrap();

        assert!(storage.exists("t/_change_data/cdc-00000000000000000003.parquet").await.unwrap());
        let listed = storage.list("t/_change_data/date=").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn empty_write_is_rejected() {
        let storage = MemoryStorage::new();
        let err = write_cdc_file(&storage, "t", 0, 0, &[]).await.unwrap_err();
        assert!(matches!(err, CdcError::EmptyWrite));
    }
}
