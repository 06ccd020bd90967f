//! Checkpoint writer: collapse a snapshot's worth of actions (the
//! result of replaying the log up to some version, with tombstoned
//! `Remove`s and superseded `Add`s already resolved away) into one or more
//! Parquet parts named `<version>.checkpoint.<part>.<total>.parquet`.

use bytes::Bytes;

use super::error::CheckpointError;
use super::row_codec::{action_to_row, schema};
use crate::codec::columnar::ColumnarWriter;
use crate::codec::path::checkpoint_file_name;
use crate::log::action::Action;
use crate::storage::Storage;

/// A single written checkpoint part's file name and row count.
pub struct CheckpointPart {
    pub file_name: String,
    pub row_count: usize,
}

/// Write `actions` as a checkpoint for `version`, splitting into multiple
/// parts when `actions.len()` exceeds `max_rows_per_part`. Parts are
/// content-determined by version + actions, so they're written
/// unconditionally (no CAS) — a concurrent writer producing the same
/// checkpoint would write identical bytes.
pub async fn write_checkpoint(
    storage: &dyn Storage,
    log_dir: &str,
    version: u64,
    actions: &[Action],
    max_rows_per_part: usize,
) -> Result<Vec<CheckpointPart>, CheckpointError> {
    let max_rows_per_part = max_rows_per_part.max(1);
    let chunks: Vec<&[Action]> = actions.chunks(max_rows_per_part).collect();
    let total = chunks.len().max(1) as u32;
    let row_schema = schema();

    let mut parts = Vec::with_capacity(chunks.len().max(1));

    if chunks.is_empty() {
        let file_name = write_part(storage, log_dir, version, 1, total, &row_schema, &[]).await?;
        parts.push(CheckpointPart { file_name, row_count: 0 });
        return Ok(parts);
    }

    for (i, chunk) in chunks.into_iter().enumerate() {
        let part = (i + 1) as u32;
        let file_name = write_part(storage, log_dir, version, part, total, &row_schema, chunk).await?;
        parts.push(CheckpointPart { file_name, row_count: chunk.len() });
    }

    Ok(parts)
}

async fn write_part(
    storage: &dyn Storage,
    log_dir: &str,
    version: u64,
    part: u32,
    total: u32,
    row_schema: &crate::row::Schema,
    actions: &[Action],
) -> Result<String, CheckpointError> {
    let mut writer = ColumnarWriter::try_new(row_schema)?;
    let rows: Vec<crate::row::Row> = actions.iter().map(action_to_row).collect::<Result<_, _>>()?;
    writer.write_rows(&rows)?;
    let (bytes, _zone_map) = writer.finish()?;

    let file_name = checkpoint_file_name(version, part, total);
    let path = format!("{}/{}", log_dir.trim_end_matches('/'), file_name);
    storage.write(&path, Bytes::from(bytes)).await?;
    Ok(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::action::ProtocolAction;
    use crate::storage::memory::MemoryStorage;

    fn actions(n: usize) -> Vec<Action> {
        (0..n).map(|_| Action::Protocol(ProtocolAction { min_reader_version: 1, min_writer_version: 1 })).collect()
    }

    #[tokio::test]
    async fn single_part_for_small_action_set() {
        let storage = MemoryStorage::new();
        let parts = write_checkpoint(&storage, "_delta_log", 5, &actions(3), 100).await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].row_count, 3);
        assert!(parts[0].file_name.contains("00000000000000000001.00000000000000000001"));
    }

    #[tokio::test]
    async fn splits_into_multiple_parts() {
        let storage = MemoryStorage::new();
        let parts = write_checkpoint(&storage, "_delta_log", 5, &actions(7), 3).await.unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.iter().map(|p| p.row_count).sum::<usize>(), 7);
        assert!(parts[2].file_name.contains(".00000000000000000003.00000000000000000003."));
    }
}
