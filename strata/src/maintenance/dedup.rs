//! Row-level deduplication: collapse rows sharing a key
//! down to one, keeping either the first or the last occurrence seen in
//! iteration order. Used by compaction/merge call sites that need exactly-
//! once semantics over a primary key without a dedicated event-time column.

use crate::row::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepStrategy {
    Earliest,
    Latest,
}

/// Deduplicate `rows` by the value at `key_path`, keeping the occurrence
/// `strategy` selects. Rows missing the key field are never deduplicated
/// against each other — each is kept.
pub fn dedup_rows(rows: Vec<Row>, key_path: &str, strategy: KeepStrategy) -> Vec<Row> {
    let mut kept: Vec<(Option<Value>, Row)> = Vec::with_capacity(rows.len());

    for row in rows {
        let key = row.get(key_path).cloned();
        match &key {
            None => kept.push((key, row)),
            Some(_) => match strategy {
                KeepStrategy::Earliest => {
                    if !kept.iter().any(|(k, _)| k.is_some() && *k == key) {
                        kept.push((key, row));
                    }
                }
                KeepStrategy::Latest => {
                    if let Some(slot) = kept.iter_mut().find(|(k, _)| k.is_some() && *k == key) {
                        slot.1 = row;
                    } else {
                        kept.push((key, row));
                    }
                }
            },
        }
    }

    kept.into_iter().map(|(_, row)| row).collect()
}
