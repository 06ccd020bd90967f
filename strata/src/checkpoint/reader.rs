//! Checkpoint reader: reassemble a (possibly multi-part)
//! checkpoint's worth of actions. Parts are named deterministically
//! (`<version>.checkpoint.<part>.<total>.parquet`), so reassembly is just
//! reading each part in ascending order — no part-level manifest needed
//! beyond the total part count.

use super::error::CheckpointError;
use super::row_codec::{row_to_action, schema};
use crate::codec::columnar::read_rows;
use crate::codec::path::checkpoint_file_name;
use crate::log::action::Action;
use crate::storage::Storage;

/// Read every action out of the checkpoint at `version`, which has `total`
/// parts (1 for a single-part checkpoint).
pub async fn read_checkpoint(
    storage: &dyn Storage,
    log_dir: &str,
    version: u64,
    total: u32,
) -> Result<Vec<Action>, CheckpointError> {
    let row_schema = schema();
    let mut actions = Vec::new();

    for part in 1..=total.max(1) {
        let file_name = checkpoint_file_name(version, part, total.max(1));
        let path = format!("{}/{}", log_dir.trim_end_matches('/'), file_name);
        let bytes = storage.read(&path).await?;
        let rows = read_rows(&bytes, &row_schema, None)?;
        for row in &rows {
            actions.push(row_to_action(row)?);
        }
    }

    Ok(actions)
}
