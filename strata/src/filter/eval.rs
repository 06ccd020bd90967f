//! Three-valued predicate evaluation: every comparison resolves to
//! `True`, `False`, or `Unknown` (a field missing, or a type mismatch that
//! leaves the comparison undefined) rather than panicking or silently
//! defaulting. `Unknown` propagates through `$and`/`$or`/`$not` using SQL's
//! classic three-valued truth tables, and a top-level `Unknown` means "does
//! not match" — the same rule document stores use for a comparison against
//! an absent field.

use std::cmp::Ordering;

use regex::Regex;

use super::ast::{Comparison, Predicate};
use crate::row::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    True,
    False,
    Unknown,
}

impl Tri {
    fn not(self) -> Tri {
        match self {
            Tri::True => Tri::False,
            Tri::False => Tri::True,
            Tri::Unknown => Tri::Unknown,
        }
    }

    fn and(clauses: impl IntoIterator<Item = Tri>) -> Tri {
        let mut saw_unknown = false;
        for c in clauses {
            match c {
                Tri::False => return Tri::False,
                Tri::Unknown => saw_unknown = true,
                Tri::True => {}
            }
        }
        if saw_unknown { Tri::Unknown } else { Tri::True }
    }

    fn or(clauses: impl IntoIterator<Item = Tri>) -> Tri {
        let mut saw_unknown = false;
        for c in clauses {
            match c {
                Tri::True => return Tri::True,
                Tri::Unknown => saw_unknown = true,
                Tri::False => {}
            }
        }
        if saw_unknown { Tri::Unknown } else { Tri::False }
    }

    /// Collapse to a boolean for a top-level match decision: only `True`
    /// counts as a match.
    pub fn is_match(self) -> bool {
        matches!(self, Tri::True)
    }
}

/// Evaluate a predicate against a row (itself a `Value::Object`, or any
/// value tree `get_path` can walk).
pub fn evaluate(predicate: &Predicate, row: &Value) -> Tri {
    match predicate {
        Predicate::MatchAll => Tri::True,
        Predicate::Field { path, comparison } => evaluate_comparison(row.get_path(path), comparison),
        Predicate::And(clauses) => Tri::and(clauses.iter().map(|c| evaluate(c, row))),
        Predicate::Or(clauses) => Tri::or(clauses.iter().map(|c| evaluate(c, row))),
        Predicate::Nor(clauses) => Tri::or(clauses.iter().map(|c| evaluate(c, row))).not(),
        Predicate::Not(inner) => evaluate(inner, row).not(),
    }
}

pub(crate) fn evaluate_comparison(field: Option<&Value>, comparison: &Comparison) -> Tri {
    if let Comparison::Exists(expected) = comparison {
        let present = field.map_or(false, |v| !v.is_null());
        return if present == *expected { Tri::True } else { Tri::False };
    }

    let Some(value) = field else {
        return Tri::Unknown;
    };
    if value.is_null() {
        return Tri::Unknown;
    }

    match comparison {
        Comparison::Eq(target) => tri_from_ordering(value.partial_cmp_value(target), Ordering::Equal),
        Comparison::Ne(target) => tri_from_ordering(value.partial_cmp_value(target), Ordering::Equal).not(),
        Comparison::Gt(target) => cmp_tri(value, target, |o| o == Ordering::Greater),
        Comparison::Gte(target) => cmp_tri(value, target, |o| o != Ordering::Less),
        Comparison::Lt(target) => cmp_tri(value, target, |o| o == Ordering::Less),
        Comparison::Lte(target) => cmp_tri(value, target, |o| o != Ordering::Greater),
        Comparison::In(set) => {
            if set.iter().any(|v| value.partial_cmp_value(v) == Some(Ordering::Equal)) {
                Tri::True
            } else {
                Tri::False
            }
        }
        Comparison::Nin(set) => {
            if set.iter().any(|v| value.partial_cmp_value(v) == Some(Ordering::Equal)) {
                Tri::False
            } else {
                Tri::True
            }
        }
        Comparison::Regex(pattern) => match value.as_str() {
            Some(s) => match compile(pattern) {
                Some(re) => {
                    if re.is_match(s) {
                        Tri::True
                    } else {
                        Tri::False
                    }
                }
                None => Tri::Unknown,
            },
            None => Tri::False,
        },
        Comparison::Exists(_) => unreachable!("handled above"),
    }
}

fn tri_from_ordering(actual: Option<Ordering>, expect: Ordering) -> Tri {
    match actual {
        Some(o) if o == expect => Tri::True,
        Some(_) => Tri::False,
        None => Tri::Unknown,
    }
}

fn cmp_tri(value: &Value, target: &Value, pred: impl Fn(Ordering) -> bool) -> Tri {
    match value.partial_cmp_value(target) {
        Some(o) if pred(o) => Tri::True,
        Some(_) => Tri::False,
        None => Tri::Unknown,
    }
}

/// An invalid pattern degrades to `Unknown` rather than a panic, since
/// predicate trees may be deserialized from untrusted input.
fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Value;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, Value)]) -> Value {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        Value::Object(map)
    }

    #[test]
    fn missing_field_is_unknown_and_does_not_match() {
        let predicate = Predicate::eq("missing", Value::Int(1));
        let r = row(&[("present", Value::Int(1))]);
        assert_eq!(evaluate(&predicate, &r), Tri::Unknown);
        assert!(!evaluate(&predicate, &r).is_match());
    }

    #[test]
    fn and_short_circuits_on_false_even_with_unknown_present() {
        let predicate = Predicate::and(vec![
            Predicate::eq("missing", Value::Int(1)),
            Predicate::eq("price", Value::Int(999)),
        ]);
        let r = row(&[("price", Value::Int(5))]);
        assert_eq!(evaluate(&predicate, &r), Tri::False);
    }

    #[test]
    fn or_short_circuits_on_true_even_with_unknown_present() {
        let predicate = Predicate::or(vec![
            Predicate::eq("missing", Value::Int(1)),
            Predicate::eq("price", Value::Int(5)),
        ]);
        let r = row(&[("price", Value::Int(5))]);
        assert_eq!(evaluate(&predicate, &r), Tri::True);
    }

    #[test]
    fn exists_checks_presence_and_non_null() {
        let r = row(&[("a", Value::Null)]);
        assert!(evaluate(&Predicate::Field { path: "a".into(), comparison: Comparison::Exists(true) }, &r).is_match() == false);
        assert!(evaluate(&Predicate::Field { path: "b".into(), comparison: Comparison::Exists(false) }, &r).is_match());
    }

    #[test]
    fn cross_type_comparison_is_unknown() {
        let r = row(&[("name", Value::String("x".into()))]);
        let predicate = Predicate::gt("name", Value::Int(1));
        assert_eq!(evaluate(&predicate, &r), Tri::Unknown);
    }

    #[test]
    fn regex_matches_string_field_only() {
        let r = row(&[("name", Value::String("widget-42".into()))]);
        let predicate = Predicate::Field {
            path: "name".into(),
            comparison: Comparison::Regex("^widget-\\d+$".into()),
        };
        assert!(evaluate(&predicate, &r).is_match());

        let numeric = row(&[("name", Value::Int(42))]);
        assert!(!evaluate(&predicate, &numeric).is_match());
    }
}
