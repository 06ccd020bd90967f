//! Document-style predicate AST: the query surface is a tree of
//! field comparisons and boolean combinators, the same shape a MongoDB-style
//! filter document takes, evaluated directly against the in-memory row
//! tree rather than compiled to a separate query language.

use crate::row::Value;

/// A single comparison against a (possibly dotted) field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    /// POSIX-ish regex match against a string field; non-string fields never
    /// match.
    Regex(String),
}

/// A filter predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `{ field: { $op: value } }` — a comparison against one field.
    Field { path: String, comparison: Comparison },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Nor(Vec<Predicate>),
    Not(Box<Predicate>),
    /// The empty filter: matches every row.
    MatchAll,
}

impl Predicate {
    pub fn eq(path: impl Into<String>, value: Value) -> Predicate {
        Predicate::Field { path: path.into(), comparison: Comparison::Eq(value) }
    }

    pub fn gt(path: impl Into<String>, value: Value) -> Predicate {
        Predicate::Field { path: path.into(), comparison: Comparison::Gt(value) }
    }

    pub fn gte(path: impl Into<String>, value: Value) -> Predicate {
        Predicate::Field { path: path.into(), comparison: Comparison::Gte(value) }
    }

    pub fn lt(path: impl Into<String>, value: Value) -> Predicate {
        Predicate::Field { path: path.into(), comparison: Comparison::Lt(value) }
    }

    pub fn lte(path: impl Into<String>, value: Value) -> Predicate {
        Predicate::Field { path: path.into(), comparison: Comparison::Lte(value) }
    }

    pub fn and(clauses: Vec<Predicate>) -> Predicate {
        Predicate::And(clauses)
    }

    pub fn or(clauses: Vec<Predicate>) -> Predicate {
        Predicate::Or(clauses)
    }

    /// Every distinct field path this predicate touches, for projection
    /// pushdown and zone-map lookups.
    pub fn referenced_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_paths(&self, out: &mut Vec<String>) {
        match self {
            Predicate::Field { path, .. } => out.push(path.clone()),
            Predicate::And(clauses) | Predicate::Or(clauses) | Predicate::Nor(clauses) => {
                for c in clauses {
                    c.collect_paths(out);
                }
            }
            Predicate::Not(inner) => inner.collect_paths(out),
            Predicate::MatchAll => {}
        }
    }
}
