//! Small-file compaction: group small live files by partition until
//! a target size is reached, then atomically replace them with one larger
//! file. Compaction never changes what a reader sees — every action it
//! emits carries `dataChange=false` — so it composes freely with ongoing
//! `data_change=true` writes.

use std::collections::BTreeMap;

use bytes::Bytes;
use uuid::Uuid;

use super::error::MaintenanceError;
use crate::codec::columnar::{read_rows, ColumnarWriter};
use crate::codec::path::partition_path;
use crate::log::action::{AddAction, RemoveAction};
use crate::row::{Row, Schema};
use crate::storage::Storage;

/// Group `files` by partition, then greedily bin files within each
/// partition into compaction groups that sum to roughly `target_size_bytes`
/// — a lone file already at or above the target is left alone (a group of
/// one is a no-op, filtered out by the caller).
pub fn plan_compaction(files: &[AddAction], target_size_bytes: u64) -> Vec<Vec<AddAction>> {
    let mut by_partition: BTreeMap<Vec<(String, Option<String>)>, Vec<AddAction>> = BTreeMap::new();
    for file in files {
        let key: Vec<(String, Option<String>)> = file.partition_values.clone().into_iter().collect();
        by_partition.entry(key).or_default().push(file.clone());
    }

    let mut groups = Vec::new();
    for mut partition_files in by_partition.into_values() {
        partition_files.sort_by_key(|f| f.size_bytes);
        let mut current: Vec<AddAction> = Vec::new();
        let mut current_size: u64 = 0;
        for file in partition_files {
            if current_size > 0 && current_size + file.size_bytes > target_size_bytes {
                groups.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current_size += file.size_bytes;
            current.push(file);
        }
        if current.len() > 1 {
            groups.push(current);
        }
    }
    groups
}

/// Rewrite one compaction group into a single output file, returning the
/// `Remove`s for the inputs and the `Add` for the output. Both carry
/// `dataChange=false`.
pub async fn execute_compaction(
    storage: &dyn Storage,
    base_dir: &str,
    schema: &Schema,
    group: &[AddAction],
    deletion_timestamp_millis: i64,
) -> Result<(Vec<RemoveAction>, AddAction), MaintenanceError> {
    let mut rows: Vec<Row> = Vec::new();
    for file in group {
        let path = format!("{}/{}", base_dir.trim_end_matches('/'), file.path);
        let bytes = storage.read(&path).await?;
        rows.extend(read_rows(&bytes, schema, None)?);
    }

    let partition_values: Vec<(String, Option<String>)> = group
        .first()
        .map(|f| f.partition_values.clone().into_iter().collect())
        .unwrap_or_default();
    let dir = partition_path(&partition_values);
    let file_name = format!("part-{}.parquet", Uuid::new_v4());
    let relative_path = if dir.is_empty() { file_name } else { format!("{dir}/{file_name}") };

    let mut writer = ColumnarWriter::try_new(schema)?;
    writer.write_rows(&rows)?;
    let (bytes, zone_map) = writer.finish()?;
    let size_bytes = bytes.len() as u64;

    let full_path = format!("{}/{}", base_dir.trim_end_matches('/'), relative_path);
    storage.write(&full_path, Bytes::from(bytes)).await?;

    let removes = group
        .iter()
        .map(|f| RemoveAction {
            path: f.path.clone(),
            deletion_timestamp_millis,
            data_change: false,
            partition_values: f.partition_values.clone(),
            size_bytes: Some(f.size_bytes),
        })
        .collect();

    let add = AddAction {
        path: relative_path,
        partition_values: partition_values.into_iter().collect(),
        size_bytes,
        modification_time_millis: deletion_timestamp_millis,
        data_change: false,
        stats: Some(zone_map),
        deletion_vector: None,
    };

    Ok((removes, add))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn file(path: &str, size: u64) -> AddAction {
        AddAction {
            path: path.into(),
            partition_values: Map::new(),
            size_bytes: size,
            modification_time_millis: 0,
            data_change: true,
            stats: None,
            deletion_vector: None,
        }
    }

    #[test]
    fn bins_small_files_up_to_target_size() {
        let files = vec![file("a", 10), file("b", 10), file("c", 10), file("d", 100)];
        let groups = plan_compaction(&files, 25);
        // a+b (20) fits, +c would exceed 25 so c starts new group alone (filtered, len 1);
        // d alone is filtered too.
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn single_already_large_file_is_not_grouped() {
        let files = vec![file("a", 1000)];
        assert!(plan_compaction(&files, 25).is_empty());
    }

    #[test]
    fn separates_by_partition() {
        let mut f1 = file("a", 10);
        f1.partition_values.insert("region".into(), Some("us".into()));
        let mut f2 = file("b", 10);
        f2.partition_values.insert("region".into(), Some("eu".into()));
        let groups = plan_compaction(&[f1, f2], 1000);
        assert!(groups.is_empty()); // one file per partition, nothing to merge
    }
}
