//! Query-side types: what a caller asks `Table::query` for, and
//! what it gets back. Projection and predicate pushdown themselves live in
//! [`crate::filter::pushdown`]; this module only shapes the engine's public
//! request/response types and the row-reshaping helpers they need.

use std::collections::BTreeMap;

use crate::row::{Row, Schema, Value};

/// An ordered list of dotted field paths to keep in each returned row. `None`
/// (the `Table::query` default) returns every field a row has.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection(pub Vec<String>);

impl Projection {
    pub fn of(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Projection(paths.into_iter().map(Into::into).collect())
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Keep only these dotted field paths in each returned row; `None` keeps
    /// every field.
    pub projection: Option<Projection>,
    /// Read the table as of this version instead of the latest committed
    /// one. `None` means "whatever this handle's cached
    /// snapshot currently is" — see [`crate::table::Table::refresh`].
    pub as_of_version: Option<u64>,
}

impl QueryOptions {
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.as_of_version = Some(version);
        self
    }
}

/// The result of a query: the matching rows plus the pushdown bookkeeping a
/// caller needs to confirm skipping actually happened.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub version: u64,
    pub files_scanned: usize,
    pub files_skipped: usize,
}

/// `describe()`'s table-level summary.
#[derive(Debug, Clone)]
pub struct TableSummary {
    pub version: u64,
    pub schema: Option<Schema>,
    pub partition_columns: Vec<String>,
    pub num_files: usize,
    pub total_size_bytes: u64,
    pub cdc_enabled: bool,
}

/// Keep only `projection`'s paths from a row, preserving nested shape for
/// dotted paths (`"doc.cat"` produces `{"doc": {"cat": ...}}`, not a
/// flattened key).
pub fn project_row(row: &Row, projection: &Projection) -> Row {
    let source = Value::Object(row.clone());
    let mut out = Value::Object(BTreeMap::new());
    for path in projection.paths() {
        if let Some(value) = source.get_path(path) {
            out.set_path(path, value.clone());
        }
    }
    match out {
        Value::Object(map) => map,
        _ => unreachable!("project_row always builds an Object"),
    }
}

/// Apply a set of dotted-path field assignments to a row, producing a new
/// row (`update`'s row transform).
pub fn apply_patch(row: &Row, patch: &BTreeMap<String, Value>) -> Row {
    let mut wrapped = Value::Object(row.clone());
    for (path, value) in patch {
        wrapped.set_path(path, value.clone());
    }
    match wrapped {
        Value::Object(map) => map,
        _ => unreachable!("apply_patch always builds an Object"),
    }
}

/// Render a row's partition-column values as the `Option<String>` shape an
/// `Add` action's `partition_values` map stores, in column order.
pub fn partition_values(row: &Row, partition_columns: &[String]) -> BTreeMap<String, Option<String>> {
    partition_columns
        .iter()
        .map(|col| {
            let rendered = match row.get(col) {
                None | Some(Value::Null) => None,
                Some(v) => Some(v.to_string()),
            };
            (col.clone(), rendered)
        })
        .collect()
}
