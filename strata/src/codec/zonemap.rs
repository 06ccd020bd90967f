//! Row-group zone maps: per-column min/max/null-count statistics
//! written alongside each data file, consulted by the filter pushdown layer
//! to skip whole files or row groups without reading them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::row::Value;

/// Statistics for a single column within one row group or file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub null_count: u64,
}

/// Zone map for one data file (or one row group within it).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneMap {
    pub row_count: u64,
    pub columns: BTreeMap<String, ColumnStats>,
}

/// The comparison operators a zone map can evaluate without reading data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ZoneMap {
    pub fn builder() -> ZoneMapBuilder {
        ZoneMapBuilder::default()
    }

    /// `true` when every row in this zone is provably excluded by
    /// `column <op> value`, i.e. the file can be skipped entirely. Returns
    /// `false` (never skip) whenever the statistics are insufficient to
    /// prove exclusion — an untracked column, or a type that doesn't
    /// order-compare against `value` — since a false negative only costs a
    /// wasted read, while a false positive would drop matching rows.
    pub fn can_skip(&self, column: &str, op: ComparisonOp, value: &Value) -> bool {
        let Some(stats) = self.columns.get(column) else {
            return false;
        };

        if stats.null_count >= self.row_count && self.row_count > 0 {
            // Every value in this zone is null; no comparison operator
            // (other than an explicit null check, handled upstream) can
            // match a non-null probe value.
            return !value.is_null();
        }

        let (Some(min), Some(max)) = (&stats.min, &stats.max) else {
            return false;
        };

        match op {
            ComparisonOp::Eq => {
                matches!(value.partial_cmp_value(min), Some(std::cmp::Ordering::Less))
                    || matches!(value.partial_cmp_value(max), Some(std::cmp::Ordering::Greater))
            }
            ComparisonOp::Ne => {
                min == max && min.partial_cmp_value(value) == Some(std::cmp::Ordering::Equal)
            }
            ComparisonOp::Gt => !matches!(max.partial_cmp_value(value), Some(std::cmp::Ordering::Greater)),
            ComparisonOp::Gte => matches!(max.partial_cmp_value(value), Some(std::cmp::Ordering::Less)),
            ComparisonOp::Lt => !matches!(min.partial_cmp_value(value), Some(std::cmp::Ordering::Less)),
            ComparisonOp::Lte => matches!(min.partial_cmp_value(value), Some(std::cmp::Ordering::Greater)),
        }
    }
}

/// Incrementally accumulates a [`ZoneMap`] while a writer streams rows.
#[derive(Default)]
pub struct ZoneMapBuilder {
    row_count: u64,
    columns: BTreeMap<String, ColumnStats>,
}

impl ZoneMapBuilder {
    pub fn observe(&mut self, column: &str, value: Option<&Value>) {
        let stats = self
            .columns
            .entry(column.to_string())
            .or_insert_with(|| ColumnStats { min: None, max: None, null_count: 0 });

        match value {
            None | Some(Value::Null) => stats.null_count += 1,
            Some(v) => {
                if stats.min.as_ref().map_or(true, |m| {
                    matches!(v.partial_cmp_value(m), Some(std::cmp::Ordering::Less))
                }) {
                    stats.min = Some(v.clone());
                }
                if stats.max.as_ref().map_or(true, |m| {
                    matches!(v.partial_cmp_value(m), Some(std::cmp::Ordering::Greater))
                }) {
                    stats.max = Some(v.clone());
                }
            }
        }
    }

    pub fn observe_row(&mut self, row: &crate::row::Row) {
        for (name, value) in row {
            self.observe(name, Some(value));
        }
        self.row_count += 1;
    }

    pub fn build(self) -> ZoneMap {
        ZoneMap {
            row_count: self.row_count,
            columns: self.columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(min: i64, max: i64, row_count: u64, null_count: u64) -> ZoneMap {
        let mut columns = BTreeMap::new();
        columns.insert(
            "price".to_string(),
            ColumnStats {
                min: Some(Value::Int(min)),
                max: Some(Value::Int(max)),
                null_count,
            },
        );
        ZoneMap { row_count, columns }
    }

    #[test]
    fn skips_file_when_query_range_misses_stats() {
        let z = zone(0, 100, 10, 0);
        assert!(z.can_skip("price", ComparisonOp::Gt, &Value::Int(500)));
        assert!(!z.can_skip("price", ComparisonOp::Gt, &Value::Int(50)));
    }

    #[test]
    fn eq_skip_outside_min_max_range() {
        let z = zone(10, 20, 5, 0);
        assert!(z.can_skip("price", ComparisonOp::Eq, &Value::Int(5)));
        assert!(z.can_skip("price", ComparisonOp::Eq, &Value::Int(25)));
        assert!(!z.can_skip("price", ComparisonOp::Eq, &Value::Int(15)));
    }

    #[test]
    fn untracked_column_never_skips() {
        let z = zone(0, 100, 10, 0);
        assert!(!z.can_skip("missing_column", ComparisonOp::Gt, &Value::Int(1000)));
    }

    #[test]
    fn all_null_zone_skips_non_null_probe() {
        let z = zone(0, 0, 5, 5);
        assert!(z.can_skip("price", ComparisonOp::Eq, &Value::Int(1)));
    }

    #[test]
    fn builder_tracks_min_max_and_nulls() {
        let mut b = ZoneMap::builder();
        b.observe("price", Some(&Value::Int(10)));
        b.observe("price", Some(&Value::Int(-5)));
        b.observe("price", None);
        let z = b.build();
        let stats = z.columns.get("price").unwrap();
        assert_eq!(stats.min, Some(Value::Int(-5)));
        assert_eq!(stats.max, Some(Value::Int(10)));
        assert_eq!(stats.null_count, 1);
    }
}
