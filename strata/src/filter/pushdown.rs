//! Filter pushdown: partition pruning, zone-map file skipping, and
//! projection column minimization — everything the table engine can decide
//! about a file without reading its data.

use std::collections::BTreeMap;

use super::ast::{Comparison, Predicate};
use super::eval::{evaluate_comparison, Tri};
use crate::codec::zonemap::{ComparisonOp, ZoneMap};
use crate::row::Value;

/// The minimal set of top-level columns a query must decode: the
/// caller's requested projection, plus any column the predicate itself
/// reads (it has to be decoded to be evaluated, even if not projected out
/// of the final result). `None` means "no pushdown requested, decode every
/// column" — the table engine's default before a caller opts into
/// projection.
pub fn minimal_read_columns(predicate: &Predicate, requested: Option<&[String]>) -> Option<Vec<String>> {
    let requested = requested?;
    let mut columns: Vec<String> = requested.to_vec();
    for path in predicate.referenced_paths() {
        let top = path.split('.').next().unwrap_or(&path).to_string();
        if !columns.contains(&top) {
            columns.push(top);
        }
    }
    Some(columns)
}

/// `true` when every row in a file described by `zone_map` is provably
/// excluded by `predicate`. Only the comparison operators zone maps can
/// reason about (`$eq $ne $gt $gte $lt $lte`) contribute; everything else
/// is treated as "might match" so the caller never drops real rows.
pub fn can_skip_file(predicate: &Predicate, zone_map: &ZoneMap) -> bool {
    match predicate {
        Predicate::MatchAll => false,
        Predicate::Field { path, comparison } => field_zonemap_excludes(path, comparison, zone_map),
        Predicate::And(clauses) => clauses.iter().any(|c| can_skip_file(c, zone_map)),
        Predicate::Or(clauses) => !clauses.is_empty() && clauses.iter().all(|c| can_skip_file(c, zone_map)),
        // Negation of a skip range isn't generally sound from min/max alone.
        Predicate::Not(_) | Predicate::Nor(_) => false,
    }
}

fn field_zonemap_excludes(path: &str, comparison: &Comparison, zone_map: &ZoneMap) -> bool {
    let Some((op, value)) = comparison_op(comparison) else {
        return false;
    };
    zone_map.can_skip(path, op, value)
}

fn comparison_op(comparison: &Comparison) -> Option<(ComparisonOp, &Value)> {
    match comparison {
        Comparison::Eq(v) => Some((ComparisonOp::Eq, v)),
        Comparison::Ne(v) => Some((ComparisonOp::Ne, v)),
        Comparison::Gt(v) => Some((ComparisonOp::Gt, v)),
        Comparison::Gte(v) => Some((ComparisonOp::Gte, v)),
        Comparison::Lt(v) => Some((ComparisonOp::Lt, v)),
        Comparison::Lte(v) => Some((ComparisonOp::Lte, v)),
        Comparison::In(_) | Comparison::Nin(_) | Comparison::Exists(_) | Comparison::Regex(_) => None,
    }
}

/// `true` when a file's Hive-style partition values provably exclude it
/// from `predicate`, without reading anything beyond the directory path.
pub fn partition_excludes(predicate: &Predicate, partition_values: &BTreeMap<String, Option<String>>) -> bool {
    match predicate {
        Predicate::MatchAll => false,
        Predicate::Field { path, comparison } => {
            let Some(raw) = partition_values.get(path) else {
                return false;
            };
            let coerced = coerce_partition_value(raw.as_deref(), comparison);
            evaluate_comparison(Some(&coerced), comparison) == Tri::False
        }
        Predicate::And(clauses) => clauses.iter().any(|c| partition_excludes(c, partition_values)),
        Predicate::Or(clauses) => {
            !clauses.is_empty() && clauses.iter().all(|c| partition_excludes(c, partition_values))
        }
        Predicate::Not(_) | Predicate::Nor(_) => false,
    }
}

fn coerce_partition_value(raw: Option<&str>, comparison: &Comparison) -> Value {
    let Some(s) = raw else {
        return Value::Null;
    };
    let like = match comparison {
        Comparison::Eq(v) | Comparison::Ne(v) | Comparison::Gt(v) | Comparison::Gte(v) | Comparison::Lt(v) | Comparison::Lte(v) => Some(v),
        _ => None,
    };
    match like {
        Some(Value::Int(_)) => s.parse::<i64>().map(Value::Int).unwrap_or_else(|_| Value::String(s.to_string())),
        Some(Value::Float(_)) => s.parse::<f64>().map(Value::Float).unwrap_or_else(|_| Value::String(s.to_string())),
        _ => Value::String(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::zonemap::ColumnStats;

    fn zone(min: i64, max: i64) -> ZoneMap {
        let mut columns = BTreeMap::new();
        columns.insert("price".to_string(), ColumnStats { min: Some(Value::Int(min)), max: Some(Value::Int(max)), null_count: 0 });
        ZoneMap { row_count: 10, columns }
    }

    #[test]
    fn projection_includes_predicate_columns() {
        let predicate = Predicate::gt("price", Value::Int(10));
        let cols = minimal_read_columns(&predicate, Some(&["name".to_string()])).unwrap();
        assert!(cols.contains(&"name".to_string()));
        assert!(cols.contains(&"price".to_string()));
    }

    #[test]
    fn no_requested_projection_means_no_pushdown() {
        let predicate = Predicate::gt("price", Value::Int(10));
        assert_eq!(minimal_read_columns(&predicate, None), None);
    }

    #[test]
    fn skips_file_outside_zonemap_range() {
        let predicate = Predicate::gt("price", Value::Int(500));
        assert!(can_skip_file(&predicate, &zone(0, 100)));
    }

    #[test]
    fn or_requires_all_clauses_to_skip() {
        let predicate = Predicate::or(vec![
            Predicate::gt("price", Value::Int(500)),
            Predicate::lt("price", Value::Int(50)),
        ]);
        // min=0,max=100: first clause skips (max<=500... wait max=100 so gt500 skips); second clause (lt 50) does not skip since min(0) < 50.
        assert!(!can_skip_file(&predicate, &zone(0, 100)));
    }

    #[test]
    fn and_skips_if_any_clause_skips() {
        let predicate = Predicate::and(vec![
            Predicate::gt("price", Value::Int(500)),
            Predicate::lt("price", Value::Int(10_000)),
        ]);
        assert!(can_skip_file(&predicate, &zone(0, 100)));
    }

    #[test]
    fn partition_pruning_excludes_non_matching_partition() {
        let predicate = Predicate::eq("country", Value::String("US".into()));
        let mut values = BTreeMap::new();
        values.insert("country".to_string(), Some("CA".to_string()));
        assert!(partition_excludes(&predicate, &values));

        let mut matching = BTreeMap::new();
        matching.insert("country".to_string(), Some("US".to_string()));
        assert!(!partition_excludes(&predicate, &matching));
    }

    #[test]
    fn partition_pruning_ignores_non_partition_fields() {
        let predicate = Predicate::eq("price", Value::Int(5));
        let values = BTreeMap::new();
        assert!(!partition_excludes(&predicate, &values));
    }
}
