//! The table engine: ties storage, the transaction log, snapshots,
//! filter pushdown, checkpoints, CDC, crash recovery, and maintenance
//! together behind one handle. Every mutating method follows the same
//! shape — read the current snapshot, plan a set of actions, attempt a
//! conditional commit, and on a version conflict either retry (`write`,
//! `update_metadata`, `commit` — fixed actions, no replanning needed since
//! their action set doesn't depend on the losing attempt) or replan against
//! the newer snapshot (`update`, `delete`, `merge` — re-reads data files,
//! since which rows match a filter can change between attempts).

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::cdc::{self, CdcDispatcher, CdcError, ChangeRecord, ChangeType};
use crate::checkpoint;
use crate::codec::columnar::{self, ColumnarWriter};
use crate::codec::deletion_vector::{DeletionVector, DeletionVectorStorage};
use crate::codec::path;
use crate::codec::shred;
use crate::codec::zonemap::ZoneMap;
use crate::filter::{evaluate, Predicate};
use crate::filter::pushdown;
use crate::log::{self, Action, AddAction, CommitInfoAction, MetadataAction, ProtocolAction, RemoveAction};
use crate::maintenance;
use crate::retry;
use crate::row::{Row, Schema, Value};
use crate::snapshot::{self, Snapshot};
use crate::storage::error::StorageError;
use crate::storage::{url, Storage};

use super::config::TableConfig;
use super::error::TableError;
use super::query::{self, QueryOptions, QueryResult, TableSummary};
use super::recovery;

const CHECKPOINT_MAX_ROWS_PER_PART: usize = 50_000;

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Options a `write` call can set. `partition_columns` only matters
/// on a table's very first write — later writes inherit the partitioning
/// already recorded in `Metadata`.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub partition_columns: Option<Vec<String>>,
    pub operation: Option<String>,
}

/// Outcome of a single committed write-path operation.
#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub version: u64,
    pub operation: String,
    pub num_added_files: usize,
    pub num_removed_files: usize,
    pub num_output_rows: usize,
}

/// Outcome of a `merge`, mirroring the row-count breakdown a caller
/// needs to confirm a merge did what it was supposed to.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub version: u64,
    pub num_matched: usize,
    pub num_not_matched: usize,
    pub num_inserted: usize,
    pub num_updated: usize,
    pub num_deleted: usize,
}

/// Partial update to a table's `Metadata` (`updateMetadata`).
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub schema: Option<Schema>,
    pub partition_columns: Option<Vec<String>>,
    pub configuration: Option<BTreeMap<String, String>>,
}

/// A handle to one table at `base_dir` within `storage`. Cheap to clone
/// conceptually (it's `Arc`-backed storage plus a little cached state), but
/// `Table` itself isn't `Clone` — share it behind an `Arc<Table>` if several
/// callers need the same cached version.
pub struct Table {
    storage: Arc<dyn Storage>,
    base_dir: String,
    config: TableConfig,
    cached_version: Mutex<Option<u64>>,
    cdc_dispatcher: Mutex<CdcDispatcher>,
    last_files_skipped: AtomicUsize,
}

impl Table {
    pub fn new(storage: Arc<dyn Storage>, base_dir: impl Into<String>, config: TableConfig) -> Self {
        Self {
            storage,
            base_dir: base_dir.into(),
            config,
            cached_version: Mutex::new(None),
            cdc_dispatcher: Mutex::new(CdcDispatcher::new()),
            last_files_skipped: AtomicUsize::new(0),
        }
    }

    /// Open a table rooted at `table_url`'s storage root. `s3://`
    /// and `r2://` URLs need credentials the URL itself can't carry — build
    /// an `ObjectStoreBackend` directly and use [`Table::new`] for those.
    pub fn open(table_url: &str, config: TableConfig) -> Result<Self, TableError> {
        let storage = url::open(table_url)?;
        Ok(Self::new(storage, "", config))
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    fn log_dir(&self) -> String {
        if self.base_dir.is_empty() {
            "_delta_log".to_string()
        } else {
            format!("{}/_delta_log", self.base_dir.trim_end_matches('/'))
        }
    }

    fn full_path(&self, relative: &str) -> String {
        if self.base_dir.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.base_dir.trim_end_matches('/'), relative)
        }
    }

    /// The cached latest committed version, reading it from storage the
    /// first time it's needed. `None` means the table has never had a
    /// successful commit.
    pub async fn version(&self) -> Result<Option<u64>, TableError> {
        if let Some(v) = *self.cached_version.lock() {
            return Ok(Some(v));
        }
        let v = log::latest_version(self.storage.as_ref(), &self.log_dir()).await?;
        if let Some(v) = v {
            *self.cached_version.lock() = Some(v);
        }
        Ok(v)
    }

    /// Drop the cached version and re-read it from storage — what a reader
    /// who lost an optimistic race calls before retrying.
    pub async fn refresh_version(&self) -> Result<Option<u64>, TableError> {
        *self.cached_version.lock() = None;
        self.version().await
    }

    /// Number of files the most recent `query` call skipped via partition
    /// pruning or zone-map exclusion.
    pub fn last_files_skipped(&self) -> usize {
        self.last_files_skipped.load(Ordering::Relaxed)
    }

    async fn snapshot_at(&self, version: Option<u64>) -> Result<Snapshot, TableError> {
        let target = match version {
            Some(v) => v,
            None => match self.version().await? {
                Some(v) => v,
                None => return Ok(Snapshot::empty()),
            },
        };
        Ok(snapshot::reconstruct(self.storage.as_ref(), &self.log_dir(), target).await?)
    }

    // ---- read path ---------------------------------------------------

    pub async fn query(&self, filter: &Predicate, options: QueryOptions) -> Result<QueryResult, TableError> {
        let version = match options.as_of_version {
            Some(v) => v,
            None => match self.version().await? {
                Some(v) => v,
                None => return Ok(QueryResult { rows: Vec::new(), version: 0, files_scanned: 0, files_skipped: 0 }),
            },
        };
        let snapshot = snapshot::reconstruct(self.storage.as_ref(), &self.log_dir(), version).await?;
        let Some(schema) = snapshot.schema() else {
            return Ok(QueryResult { rows: Vec::new(), version, files_scanned: 0, files_skipped: 0 });
        };

        let requested_columns = options.projection.as_ref().map(|p| p.paths().to_vec());
        let read_columns = pushdown::minimal_read_columns(filter, requested_columns.as_deref());

        let mut files_scanned = 0usize;
        let mut files_skipped = 0usize;
        let mut rows = Vec::new();

        for file in snapshot.live_files.values() {
            if pushdown::partition_excludes(filter, &file.partition_values) {
                files_skipped += 1;
                continue;
            }
            if let Some(stats) = &file.stats {
                if pushdown::can_skip_file(filter, stats) {
                    files_skipped += 1;
                    continue;
                }
            }
            files_scanned += 1;

            let bytes = self.storage.read(&self.full_path(&file.path)).await?;
            let file_rows = columnar::read_rows(&bytes, &schema, read_columns.as_deref())?;
            let deleted = self.load_deletion_vector(file).await?;

            for (idx, row) in file_rows.into_iter().enumerate() {
                if deleted.as_ref().is_some_and(|dv| dv.contains(idx as u32)) {
                    continue;
                }
                let wrapped = Value::Object(row);
                if !evaluate(filter, &wrapped).is_match() {
                    continue;
                }
                let Value::Object(row) = wrapped else { unreachable!("query always wraps a row as Object") };
                let projected = match &options.projection {
                    Some(p) => query::project_row(&row, p),
                    None => row,
                };
                rows.push(projected);
            }
        }

        self.last_files_skipped.store(files_skipped, Ordering::Relaxed);
        Ok(QueryResult { rows, version, files_scanned, files_skipped })
    }

    pub async fn describe(&self) -> Result<TableSummary, TableError> {
        let Some(version) = self.version().await? else {
            return Ok(TableSummary {
                version: 0,
                schema: None,
                partition_columns: Vec::new(),
                num_files: 0,
                total_size_bytes: 0,
                cdc_enabled: self.config.cdc_enabled,
            });
        };
        let snapshot = self.snapshot_at(Some(version)).await?;
        let total_size_bytes = snapshot.live_files.values().map(|f| f.size_bytes).sum();
        Ok(TableSummary {
            version,
            schema: snapshot.schema(),
            partition_columns: snapshot.partition_columns().to_vec(),
            num_files: snapshot.live_files.len(),
            total_size_bytes,
            cdc_enabled: self.config.cdc_enabled,
        })
    }

    pub async fn history(&self) -> Result<Vec<(u64, Option<CommitInfoAction>)>, TableError> {
        Ok(snapshot::history(self.storage.as_ref(), &self.log_dir()).await?)
    }

    async fn load_deletion_vector(&self, file: &AddAction) -> Result<Option<DeletionVector>, TableError> {
        let Some(descriptor) = &file.deletion_vector else { return Ok(None) };
        match &descriptor.storage {
            DeletionVectorStorage::Inline { .. } => Ok(Some(DeletionVector::from_inline_descriptor(descriptor)?)),
            DeletionVectorStorage::OnDisk { relative_path, offset, size_in_bytes } => {
                let full_path = self.full_path(relative_path);
                let end = *offset as u64 + *size_in_bytes as u64;
                let bytes = self.storage.read_range(&full_path, *offset as u64, end).await?;
                Ok(Some(DeletionVector::deserialize(&bytes)?))
            }
        }
    }

    // ---- write path ----------------------------------------------------

    /// Blind-append a batch of rows. The first write on a
    /// table also establishes its `Protocol`/`Metadata` (schema inferred
    /// from `rows[0]` unless the caller's `options` fixes partitioning).
    pub async fn write(&self, rows: Vec<Row>, options: WriteOptions) -> Result<CommitSummary, TableError> {
        if rows.is_empty() {
            return Err(TableError::Validation("write requires at least one row".into()));
        }

        let current_version = self.version().await?;
        let snapshot = match current_version {
            Some(v) => self.snapshot_at(Some(v)).await?,
            None => Snapshot::empty(),
        };

        let schema = match snapshot.schema() {
            Some(s) => {
                for row in &rows {
                    if !s.matches(row) {
                        return Err(TableError::SchemaMismatch(format!("row does not match table schema: {row:?}")));
                    }
                }
                s
            }
            None => Schema::infer(&rows[0]),
        };

        let partition_columns = if current_version.is_some() {
            snapshot.partition_columns().to_vec()
        } else {
            options.partition_columns.clone().unwrap_or_default()
        };

        let (add_actions, marker) = self.write_partitioned_files(&schema, &partition_columns, &rows).await?;
        let timestamp = now_millis();

        let mut actions = Vec::new();
        if current_version.is_none() {
            actions.push(Action::Protocol(ProtocolAction {
                min_reader_version: snapshot::READER_VERSION,
                min_writer_version: 1,
            }));
            actions.push(Action::Metadata(MetadataAction {
                id: Uuid::new_v4().to_string(),
                schema_json: schema.to_json_string(),
                partition_columns: partition_columns.clone(),
                configuration: BTreeMap::new(),
                created_time_millis: timestamp,
            }));
        }
        let operation = options.operation.clone().unwrap_or_else(|| "WRITE".to_string());
        actions.extend(add_actions.iter().cloned().map(Action::Add));
        actions.push(Action::CommitInfo(CommitInfoAction {
            timestamp_millis: timestamp,
            operation: operation.clone(),
            operation_parameters: BTreeMap::new(),
            is_blind_append: Some(true),
        }));

        let start_version = current_version.map(|v| v + 1).unwrap_or(0);
        let result = self.commit_fixed(start_version, actions).await?;
        recovery::clear_pending(self.storage.as_ref(), &self.log_dir(), &marker.marker_id).await?;

        if self.config.cdc_enabled {
            let records: Vec<ChangeRecord> = rows
                .iter()
                .map(|r| ChangeRecord {
                    change_type: ChangeType::Insert,
                    commit_version: result.version,
                    commit_timestamp_millis: timestamp,
                    data: r.clone(),
                })
                .collect();
            self.emit_cdc(result.version, timestamp, &records).await;
        }

        Ok(CommitSummary {
            version: result.version,
            operation,
            num_added_files: add_actions.len(),
            num_removed_files: 0,
            num_output_rows: rows.len(),
        })
    }

    /// Delete every row matching `filter`. Rewrites each touched file
    /// with the matching rows removed rather than attaching a deletion
    /// vector (see DESIGN.md's Open Question 1).
    pub async fn delete(&self, filter: &Predicate) -> Result<CommitSummary, TableError> {
        self.rewrite_matching(filter, None).await
    }

    /// Apply `updates` (dotted-path field assignments) to every row matching
    /// `filter`.
    pub async fn update(&self, filter: &Predicate, updates: BTreeMap<String, Value>) -> Result<CommitSummary, TableError> {
        self.rewrite_matching(filter, Some(updates)).await
    }

    async fn rewrite_matching(
        &self,
        filter: &Predicate,
        updates: Option<BTreeMap<String, Value>>,
    ) -> Result<CommitSummary, TableError> {
        let operation = if updates.is_some() { "UPDATE" } else { "DELETE" };

        retry::with_retry(
            &self.config.retry_policy,
            |_attempt| async {
                *self.cached_version.lock() = None;
                let current_version = self.version().await?.ok_or(TableError::NotFound)?;
                let snapshot = self.snapshot_at(Some(current_version)).await?;
                let schema = snapshot.schema().ok_or_else(|| TableError::Validation("table has no schema".into()))?;
                let partition_columns = snapshot.partition_columns().to_vec();
                let timestamp = now_millis();

                let mut removes = Vec::new();
                let mut surviving_rows: Vec<Row> = Vec::new();
                let mut cdc_records = Vec::new();
                let mut matched_any = false;

                for file in snapshot.live_files.values() {
                    if pushdown::partition_excludes(filter, &file.partition_values) {
                        // No row in this partition can match — leave the file as-is,
                        // untouched by this commit's Remove/Add set.
                        continue;
                    }
                    if let Some(stats) = &file.stats {
                        if pushdown::can_skip_file(filter, stats) {
                            continue;
                        }
                    }

                    let bytes = self.storage.read(&self.full_path(&file.path)).await?;
                    let rows = columnar::read_rows(&bytes, &schema, None)?;

                    let mut file_touched = false;
                    let mut remaining = Vec::new();
                    for row in rows {
                        let wrapped = Value::Object(row.clone());
                        if evaluate(filter, &wrapped).is_match() {
                            matched_any = true;
                            file_touched = true;
                            match &updates {
                                Some(patch) => {
                                    let updated = query::apply_patch(&row, patch);
                                    cdc_records.push(ChangeRecord {
                                        change_type: ChangeType::UpdatePreimage,
                                        commit_version: 0,
                                        commit_timestamp_millis: timestamp,
                                        data: row.clone(),
                                    });
                                    cdc_records.push(ChangeRecord {
                                        change_type: ChangeType::UpdatePostimage,
                                        commit_version: 0,
                                        commit_timestamp_millis: timestamp,
                                        data: updated.clone(),
                                    });
                                    remaining.push(updated);
                                }
                                None => {
                                    cdc_records.push(ChangeRecord {
                                        change_type: ChangeType::Delete,
                                        commit_version: 0,
                                        commit_timestamp_millis: timestamp,
                                        data: row,
                                    });
                                }
                            }
                        } else {
                            remaining.push(row);
                        }
                    }

                    if file_touched {
                        removes.push(RemoveAction {
                            path: file.path.clone(),
                            deletion_timestamp_millis: timestamp,
                            data_change: true,
                            partition_values: file.partition_values.clone(),
                            size_bytes: Some(file.size_bytes),
                        });
                    }
                    surviving_rows.extend(remaining);
                }

                if !matched_any {
                    return Err(TableError::NoMatch);
                }

                let (adds, marker) =
                    self.write_partitioned_files(&schema, &partition_columns, &surviving_rows).await?;
                let data_file_paths = marker.data_file_paths.clone();

                let mut actions: Vec<Action> = removes.iter().cloned().map(Action::Remove).collect();
                actions.extend(adds.iter().cloned().map(Action::Add));
                actions.push(Action::CommitInfo(CommitInfoAction {
                    timestamp_millis: timestamp,
                    operation: operation.to_string(),
                    operation_parameters: BTreeMap::new(),
                    is_blind_append: Some(false),
                }));

                let next_version = current_version + 1;
                let commit_path = format!(
                    "{}/{}",
                    self.log_dir().trim_end_matches('/'),
                    path::commit_file_name(next_version)
                );
                let ndjson = log::action::encode_actions(&actions)?;

                match self.storage.write_conditional(&commit_path, Bytes::from(ndjson), None).await {
                    Ok(_) => {
                        recovery::clear_pending(self.storage.as_ref(), &self.log_dir(), &marker.marker_id).await?;
                        *self.cached_version.lock() = Some(next_version);
                        self.maybe_checkpoint(next_version).await;

                        if self.config.cdc_enabled && !cdc_records.is_empty() {
                            for record in &mut cdc_records {
                                record.commit_version = next_version;
                            }
                            self.emit_cdc(next_version, timestamp, &cdc_records).await;
                        }

                        Ok(CommitSummary {
                            version: next_version,
                            operation: operation.to_string(),
                            num_added_files: adds.len(),
                            num_removed_files: removes.len(),
                            num_output_rows: surviving_rows.len(),
                        })
                    }
                    Err(StorageError::VersionMismatch { .. }) => {
                        for relative in &data_file_paths {
                            let _ = self.storage.delete(&self.full_path(relative)).await;
                        }
                        recovery::clear_pending(self.storage.as_ref(), &self.log_dir(), &marker.marker_id).await?;
                        Err(TableError::Concurrency { expected: Some(next_version), actual: None })
                    }
                    Err(e) => Err(e.into()),
                }
            },
            |delay| tokio::time::sleep(delay),
        )
        .await
    }

    /// Merge `rows` into the table by `match_key`. `when_matched`
    /// decides what an incoming row does to the existing row it matched —
    /// `Some(row)` replaces it, `None` deletes it. `when_not_matched`
    /// decides whether an incoming row with no match gets inserted.
    pub async fn merge(
        &self,
        rows: Vec<Row>,
        match_key: &str,
        when_matched: impl Fn(&Row, &Row) -> Option<Row>,
        when_not_matched: impl Fn(&Row) -> Option<Row>,
    ) -> Result<MergeOutcome, TableError> {
        if rows.is_empty() {
            return Err(TableError::Validation("merge requires at least one row".into()));
        }

        retry::with_retry(
            &self.config.retry_policy,
            |_attempt| async {
                *self.cached_version.lock() = None;
                let current_version = self.version().await?;
                let snapshot = match current_version {
                    Some(v) => self.snapshot_at(Some(v)).await?,
                    None => Snapshot::empty(),
                };

                let schema = match snapshot.schema() {
                    Some(s) => s,
                    None => Schema::infer(&rows[0]),
                };
                let partition_columns = snapshot.partition_columns().to_vec();
                let timestamp = now_millis();

                let mut existing_by_file: Vec<(AddAction, Vec<Row>)> = Vec::new();
                for file in snapshot.live_files.values() {
                    let bytes = self.storage.read(&self.full_path(&file.path)).await?;
                    let file_rows = columnar::read_rows(&bytes, &schema, None)?;
                    existing_by_file.push((file.clone(), file_rows));
                }

                let mut matched_keys: HashSet<String> = HashSet::new();
                let mut num_matched = 0usize;
                let mut num_updated = 0usize;
                let mut num_deleted = 0usize;
                let mut cdc_records = Vec::new();
                let mut removes = Vec::new();
                let mut surviving_rows: Vec<Row> = Vec::new();

                for (file, file_rows) in &existing_by_file {
                    let mut file_touched = false;
                    let mut remaining = Vec::new();
                    for existing_row in file_rows {
                        let key = existing_row.get(match_key).map(|v| v.to_string());
                        let incoming = key.as_ref().and_then(|k| {
                            rows.iter().find(|r| r.get(match_key).map(|v| v.to_string()).as_ref() == Some(k))
                        });
                        match incoming {
                            Some(incoming_row) => {
                                num_matched += 1;
                                if let Some(k) = &key {
                                    matched_keys.insert(k.clone());
                                }
                                match when_matched(existing_row, incoming_row) {
                                    Some(updated) => {
                                        num_updated += 1;
                                        file_touched = true;
                                        cdc_records.push(ChangeRecord {
                                            change_type: ChangeType::UpdatePreimage,
                                            commit_version: 0,
                                            commit_timestamp_millis: timestamp,
                                            data: existing_row.clone(),
                                        });
                                        cdc_records.push(ChangeRecord {
                                            change_type: ChangeType::UpdatePostimage,
                                            commit_version: 0,
                                            commit_timestamp_millis: timestamp,
                                            data: updated.clone(),
                                        });
                                        remaining.push(updated);
                                    }
                                    None => {
                                        num_deleted += 1;
                                        file_touched = true;
                                        cdc_records.push(ChangeRecord {
                                            change_type: ChangeType::Delete,
                                            commit_version: 0,
                                            commit_timestamp_millis: timestamp,
                                            data: existing_row.clone(),
                                        });
                                    }
                                }
                            }
                            None => remaining.push(existing_row.clone()),
                        }
                    }
                    if file_touched {
                        removes.push(RemoveAction {
                            path: file.path.clone(),
                            deletion_timestamp_millis: timestamp,
                            data_change: true,
                            partition_values: file.partition_values.clone(),
                            size_bytes: Some(file.size_bytes),
                        });
                    }
                    surviving_rows.extend(remaining);
                }

                let mut num_not_matched = 0usize;
                let mut num_inserted = 0usize;
                for row in &rows {
                    let key = row.get(match_key).map(|v| v.to_string());
                    let is_new = key.as_ref().map_or(true, |k| !matched_keys.contains(k));
                    if is_new {
                        num_not_matched += 1;
                        if let Some(inserted) = when_not_matched(row) {
                            num_inserted += 1;
                            cdc_records.push(ChangeRecord {
                                change_type: ChangeType::Insert,
                                commit_version: 0,
                                commit_timestamp_millis: timestamp,
                                data: inserted.clone(),
                            });
                            surviving_rows.push(inserted);
                        }
                    }
                }

                let (adds, marker) =
                    self.write_partitioned_files(&schema, &partition_columns, &surviving_rows).await?;
                let data_file_paths = marker.data_file_paths.clone();

                let mut actions: Vec<Action> = Vec::new();
                if current_version.is_none() {
                    actions.push(Action::Protocol(ProtocolAction {
                        min_reader_version: snapshot::READER_VERSION,
                        min_writer_version: 1,
                    }));
                    actions.push(Action::Metadata(MetadataAction {
                        id: Uuid::new_v4().to_string(),
                        schema_json: schema.to_json_string(),
                        partition_columns: partition_columns.clone(),
                        configuration: BTreeMap::new(),
                        created_time_millis: timestamp,
                    }));
                }
                actions.extend(removes.iter().cloned().map(Action::Remove));
                actions.extend(adds.iter().cloned().map(Action::Add));
                actions.push(Action::CommitInfo(CommitInfoAction {
                    timestamp_millis: timestamp,
                    operation: "MERGE".into(),
                    operation_parameters: BTreeMap::new(),
                    is_blind_append: Some(false),
                }));

                let start_version = current_version.map(|v| v + 1).unwrap_or(0);
                let commit_path = format!(
                    "{}/{}",
                    self.log_dir().trim_end_matches('/'),
                    path::commit_file_name(start_version)
                );
                let ndjson = log::action::encode_actions(&actions)?;

                match self.storage.write_conditional(&commit_path, Bytes::from(ndjson), None).await {
                    Ok(_) => {
                        recovery::clear_pending(self.storage.as_ref(), &self.log_dir(), &marker.marker_id).await?;
                        *self.cached_version.lock() = Some(start_version);
                        self.maybe_checkpoint(start_version).await;

                        if self.config.cdc_enabled && !cdc_records.is_empty() {
                            for record in &mut cdc_records {
                                record.commit_version = start_version;
                            }
                            self.emit_cdc(start_version, timestamp, &cdc_records).await;
                        }

                        Ok(MergeOutcome {
                            version: start_version,
                            num_matched,
                            num_not_matched,
                            num_inserted,
                            num_updated,
                            num_deleted,
                        })
                    }
                    Err(StorageError::VersionMismatch { .. }) => {
                        for relative in &data_file_paths {
                            let _ = self.storage.delete(&self.full_path(relative)).await;
                        }
                        recovery::clear_pending(self.storage.as_ref(), &self.log_dir(), &marker.marker_id).await?;
                        Err(TableError::Concurrency { expected: Some(start_version), actual: None })
                    }
                    Err(e) => Err(e.into()),
                }
            },
            |delay| tokio::time::sleep(delay),
        )
        .await
    }

    /// Update a table's `Metadata` (schema, partitioning, configuration)
    /// without touching any data file.
    pub async fn update_metadata(&self, patch: MetadataPatch) -> Result<CommitSummary, TableError> {
        let current_version = self.version().await?.ok_or(TableError::NotFound)?;
        let snapshot = self.snapshot_at(Some(current_version)).await?;
        let mut metadata =
            snapshot.metadata.clone().ok_or_else(|| TableError::Validation("table has no metadata".into()))?;

        if let Some(schema) = &patch.schema {
            metadata.schema_json = schema.to_json_string();
        }
        if let Some(partition_columns) = &patch.partition_columns {
            metadata.partition_columns = partition_columns.clone();
        }
        if let Some(configuration) = &patch.configuration {
            for (k, v) in configuration {
                metadata.configuration.insert(k.clone(), v.clone());
            }
        }

        let timestamp = now_millis();
        let actions = vec![
            Action::Metadata(metadata),
            Action::CommitInfo(CommitInfoAction {
                timestamp_millis: timestamp,
                operation: "UPDATE_METADATA".into(),
                operation_parameters: BTreeMap::new(),
                is_blind_append: Some(true),
            }),
        ];

        let result = self.commit_fixed(current_version + 1, actions).await?;
        Ok(CommitSummary {
            version: result.version,
            operation: "UPDATE_METADATA".into(),
            num_added_files: 0,
            num_removed_files: 0,
            num_output_rows: 0,
        })
    }

    /// Low-level escape hatch: commit a caller-built action list directly
    /// No schema validation, no CDC emission — for callers building
    /// their own higher-level operation on top of the log.
    pub async fn commit(&self, actions: Vec<Action>) -> Result<CommitSummary, TableError> {
        let start_version = self.version().await?.map(|v| v + 1).unwrap_or(0);
        let num_added_files = actions.iter().filter(|a| matches!(a, Action::Add(_))).count();
        let num_removed_files = actions.iter().filter(|a| matches!(a, Action::Remove(_))).count();
        let result = self.commit_fixed(start_version, actions).await?;
        Ok(CommitSummary {
            version: result.version,
            operation: "COMMIT".into(),
            num_added_files,
            num_removed_files,
            num_output_rows: 0,
        })
    }

    /// Toggle `delta.enableChangeDataFeed`, mirrored into `_cdc_config.json`
    /// Takes effect from the next commit only — see DESIGN.md's
    /// Open Question 3.
    pub async fn set_cdc_enabled(&self, enabled: bool) -> Result<CommitSummary, TableError> {
        cdc::write_cdc_config(
            self.storage.as_ref(),
            &self.base_dir,
            &cdc::CdcConfig { enabled, retention_ms: self.config.cdc_retention_millis },
        )
        .await?;

        let mut configuration = BTreeMap::new();
        configuration.insert(cdc::config::CONFIG_KEY.to_string(), enabled.to_string());
        self.update_metadata(MetadataPatch { schema: None, partition_columns: None, configuration: Some(configuration) })
            .await
    }

    pub async fn read_cdc_by_version(&self, start: u64, end: u64) -> Result<Vec<ChangeRecord>, TableError> {
        if !self.config.cdc_enabled {
            return Err(TableError::Cdc(CdcError::CdcNotEnabled));
        }
        Ok(cdc::read_by_version(self.storage.as_ref(), &self.base_dir, start, end).await?)
    }

    pub async fn read_cdc_by_timestamp(&self, start: i64, end: i64) -> Result<Vec<ChangeRecord>, TableError> {
        if !self.config.cdc_enabled {
            return Err(TableError::Cdc(CdcError::CdcNotEnabled));
        }
        Ok(cdc::read_by_timestamp(self.storage.as_ref(), &self.base_dir, start, end).await?)
    }

    /// Register a CDC subscriber, invoked in commit order after every commit
    /// that produced change records, while `config.cdc_enabled` is set.
    pub fn subscribe_cdc(
        &self,
        handler: impl Fn(&ChangeRecord) -> Result<(), String> + Send + Sync + 'static,
        on_error: Option<Box<dyn Fn(&ChangeRecord, &str) + Send + Sync>>,
    ) {
        self.cdc_dispatcher.lock().subscribe(handler, on_error);
    }

    // ---- maintenance ----------------------------------------------------

    /// Bin small live files into larger ones. A no-op commit (no
    /// version bump) when nothing qualifies.
    pub async fn compact(&self) -> Result<CommitSummary, TableError> {
        let current_version = self.version().await?.ok_or(TableError::NotFound)?;
        let snapshot = self.snapshot_at(Some(current_version)).await?;
        let schema = snapshot.schema().ok_or_else(|| TableError::Validation("table has no schema".into()))?;
        let files: Vec<AddAction> = snapshot.live_files.values().cloned().collect();
        let groups = maintenance::plan_compaction(&files, self.config.compaction_target_size_bytes);
        if groups.is_empty() {
            return Ok(CommitSummary {
                version: current_version,
                operation: "COMPACT".into(),
                num_added_files: 0,
                num_removed_files: 0,
                num_output_rows: 0,
            });
        }

        let timestamp = now_millis();
        let mut actions = Vec::new();
        let mut num_added = 0;
        let mut num_removed = 0;
        for group in &groups {
            let (removes, add) =
                maintenance::execute_compaction(self.storage.as_ref(), &self.base_dir, &schema, group, timestamp)
                    .await?;
            num_removed += removes.len();
            num_added += 1;
            actions.extend(removes.into_iter().map(Action::Remove));
            actions.push(Action::Add(add));
        }
        actions.push(Action::CommitInfo(CommitInfoAction {
            timestamp_millis: timestamp,
            operation: "COMPACT".into(),
            operation_parameters: BTreeMap::new(),
            is_blind_append: Some(false),
        }));

        let result = self.commit_fixed(current_version + 1, actions).await?;
        Ok(CommitSummary {
            version: result.version,
            operation: "COMPACT".into(),
            num_added_files: num_added,
            num_removed_files: num_removed,
            num_output_rows: 0,
        })
    }

    /// Physically delete tombstoned files past `config.vacuum_retention_millis`
    /// `now_millis_value` is caller-supplied so tests can simulate
    /// the passage of time.
    pub async fn vacuum(&self, now_millis_value: i64) -> Result<Vec<String>, TableError> {
        Ok(maintenance::vacuum(
            self.storage.as_ref(),
            &self.log_dir(),
            &self.base_dir,
            self.config.vacuum_retention_millis,
            now_millis_value,
        )
        .await?)
    }

    /// Clean up data files orphaned by a writer that crashed between
    /// uploading them and committing.
    pub async fn recover(&self) -> Result<Vec<String>, TableError> {
        recovery::recover_orphaned_files(self.storage.as_ref(), &self.log_dir(), &self.base_dir).await
    }

    // ---- internals --------------------------------------------------

    /// Commit a fixed action list, retrying the version on a CAS conflict
    /// Suitable only when `actions` doesn't need to change between
    /// attempts — callers that must replan (`update`/`delete`/`merge`) drive
    /// their own CAS loop instead.
    async fn commit_fixed(&self, start_version: u64, actions: Vec<Action>) -> Result<log::CommitResult, TableError> {
        let result = log::commit_with_retry(
            self.storage.as_ref(),
            &self.log_dir(),
            start_version,
            &self.config.retry_policy,
            |_| actions.clone(),
        )
        .await?;
        *self.cached_version.lock() = Some(result.version);
        self.maybe_checkpoint(result.version).await;
        Ok(result)
    }

    /// Build one Parquet part per partition key in memory, record a crash
    /// recovery marker naming every path *before* any of them is uploaded
    /// the marker must predate the blobs it describes, not follow
    /// them), then upload. Returns the marker alongside the `Add` actions so
    /// the caller can clear it once the commit that references these files
    /// actually lands, or delete the files and marker together on a lost
    /// CAS race.
    async fn write_partitioned_files(
        &self,
        schema: &Schema,
        partition_columns: &[String],
        rows: &[Row],
    ) -> Result<(Vec<AddAction>, recovery::PendingCommit), TableError> {
        let mut groups: BTreeMap<Vec<(String, Option<String>)>, Vec<Row>> = BTreeMap::new();
        for row in rows {
            let values = query::partition_values(row, partition_columns);
            groups.entry(values.into_iter().collect()).or_default().push(row.clone());
        }

        let timestamp = now_millis();
        let mut planned: Vec<(String, Vec<u8>, AddAction)> = Vec::new();

        for (key, group_rows) in groups {
            let dir = path::partition_path(&key);
            let file_name = format!("part-{}.parquet", Uuid::new_v4());
            let relative_path = if dir.is_empty() { file_name } else { format!("{dir}/{file_name}") };

            let mut writer = ColumnarWriter::try_new(schema)?;
            writer.write_rows(&group_rows)?;
            let (bytes, mut zone_map) = writer.finish()?;
            self.merge_shredded_stats(&group_rows, &mut zone_map);

            let add = AddAction {
                path: relative_path.clone(),
                partition_values: key.into_iter().collect(),
                size_bytes: bytes.len() as u64,
                modification_time_millis: timestamp,
                data_change: true,
                stats: Some(zone_map),
                deletion_vector: None,
            };
            planned.push((relative_path, bytes, add));
        }

        let data_file_paths = planned.iter().map(|(p, _, _)| p.clone()).collect();
        let marker = recovery::record_pending(self.storage.as_ref(), &self.log_dir(), data_file_paths).await?;

        let mut adds = Vec::with_capacity(planned.len());
        for (relative_path, bytes, add) in planned {
            self.storage.write(&self.full_path(&relative_path), Bytes::from(bytes)).await?;
            adds.push(add);
        }
        Ok((adds, marker))
    }

    /// Bridge VARIANT shredding into the zone map a
    /// file's written with: for each configured `(dotted_path, type)`, shred
    /// the leaf field out of every row in the group and fold the resulting
    /// stats in under `"{column}.typed_value.{leaf}.typed_value"`, so a
    /// predicate against that nested path can skip files the same way a
    /// top-level column comparison does.
    fn merge_shredded_stats(&self, rows: &[Row], zone_map: &mut ZoneMap) {
        for (field_path, data_type) in &self.config.shredded_fields {
            let Some((column, leaf)) = field_path.split_once('.') else { continue };
            let stats_key = format!("{column}.typed_value.{leaf}.typed_value");

            let mut builder = ZoneMap::builder();
            for row in rows {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                let result = shred::shred(&value, leaf, *data_type);
                builder.observe(&stats_key, result.typed_value.as_ref());
            }
            let shredded = builder.build();
            zone_map.columns.extend(shredded.columns);
        }
    }

    /// Write a checkpoint when `config.checkpoint_policy` says it's due, and
    /// trim log versions past `config.log_retention_millis`. Failures
    /// here are logged, never propagated — a missed checkpoint costs replay
    /// work on the next read, not correctness.
    async fn maybe_checkpoint(&self, version: u64) {
        if let Err(e) = self.try_checkpoint(version).await {
            tracing::warn!(error = %e, version, "checkpoint write failed, continuing without it");
        }
    }

    async fn try_checkpoint(&self, version: u64) -> Result<(), TableError> {
        let log_dir = self.log_dir();
        let last = checkpoint::read_last_checkpoint(self.storage.as_ref(), &log_dir).await?;
        let from = last.as_ref().map(|c| c.version + 1).unwrap_or(0);
        if from > version {
            return Ok(());
        }

        let commits_since_last = version - from + 1;
        let mut bytes_since_last = 0u64;
        for v in from..=version {
            let commit_path = format!("{}/{}", log_dir.trim_end_matches('/'), path::commit_file_name(v));
            if let Some(stat) = self.storage.stat(&commit_path).await? {
                bytes_since_last += stat.size;
            }
        }

        if !self.config.checkpoint_policy.should_checkpoint(commits_since_last, bytes_since_last) {
            return Ok(());
        }

        let snapshot = snapshot::reconstruct(self.storage.as_ref(), &log_dir, version).await?;
        let mut actions = Vec::new();
        if let Some(p) = &snapshot.protocol {
            actions.push(Action::Protocol(p.clone()));
        }
        if let Some(m) = &snapshot.metadata {
            actions.push(Action::Metadata(m.clone()));
        }
        let num_of_add_files = snapshot.live_files.len() as u64;
        for add in snapshot.live_files.values() {
            actions.push(Action::Add(add.clone()));
        }

        let parts =
            checkpoint::write_checkpoint(self.storage.as_ref(), &log_dir, version, &actions, CHECKPOINT_MAX_ROWS_PER_PART)
                .await?;
        checkpoint::write_last_checkpoint(
            self.storage.as_ref(),
            &log_dir,
            &checkpoint::LastCheckpoint {
                version,
                size: actions.len() as u64,
                parts: Some(parts.len() as u32),
                size_in_bytes: None,
                num_of_add_files: Some(num_of_add_files),
            },
        )
        .await?;

        if self.config.log_retention_millis >= 0 {
            let cleanable = checkpoint::cleanable_versions(
                self.storage.as_ref(),
                &log_dir,
                version,
                self.config.log_retention_millis,
                now_millis(),
            )
            .await?;
            if !cleanable.is_empty() {
                checkpoint::delete_versions(self.storage.as_ref(), &log_dir, &cleanable).await?;
            }
        }

        tracing::info!(version, parts = parts.len(), "wrote checkpoint");
        Ok(())
    }

    /// Write a commit's CDC side files and fan them out to subscribers.
    /// Swallowed on failure (logged), same as a missed checkpoint — the
    /// commit that produced these records already succeeded.
    async fn emit_cdc(&self, version: u64, timestamp: i64, records: &[ChangeRecord]) {
        if records.is_empty() {
            return;
        }
        if let Err(e) = cdc::write_cdc_file(self.storage.as_ref(), &self.base_dir, version, timestamp, records).await {
            tracing::warn!(error = %e, version, "CDC file write failed");
            return;
        }
        self.cdc_dispatcher.lock().dispatch(records);
    }
}
