//! VARIANT shredding: pull a frequently-queried field
//! out of an otherwise-opaque VARIANT/object column into its own typed
//! column, leaving the remainder ("untyped_value") as a smaller residual
//! object. Shredding is purely a physical-layout optimization — the logical
//! value returned by [`unshred`] is identical to the original, whether or
//! not the field actually got pulled out.

use crate::row::{DataType, Value};

/// Result of attempting to shred one field out of a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ShredResult {
    /// `Some` when the field was present and matched `expected_type`.
    pub typed_value: Option<Value>,
    /// The original value with the shredded field removed (or unchanged,
    /// when the field wasn't shredded).
    pub untyped_value: Value,
}

/// Attempt to shred the field at `field_path` (a dotted path, e.g. `"cat"`
/// or `"doc.cat"`) out of `value`, provided its runtime type matches
/// `expected_type`. A type mismatch or missing field leaves `value`
/// untouched in `untyped_value` and `typed_value` as `None` — shredding
/// never changes what a reader observes, only where the bytes live.
pub fn shred(value: &Value, field_path: &str, expected_type: DataType) -> ShredResult {
    let segments: Vec<&str> = field_path.split('.').collect();

    let Some(candidate) = value.get_path(field_path) else {
        return ShredResult { typed_value: None, untyped_value: value.clone() };
    };

    if runtime_type(candidate) != Some(expected_type) {
        return ShredResult { typed_value: None, untyped_value: value.clone() };
    }

    let typed_value = candidate.clone();
    let mut untyped_value = value.clone();
    remove_path(&mut untyped_value, &segments);
    ShredResult { typed_value: Some(typed_value), untyped_value }
}

/// Reconstruct the original logical value from a shredded representation.
pub fn unshred(untyped_value: &Value, field_path: &str, typed_value: Option<&Value>) -> Value {
    match typed_value {
        None => untyped_value.clone(),
        Some(v) => {
            let mut restored = untyped_value.clone();
            restored.set_path(field_path, v.clone());
            restored
        }
    }
}

fn runtime_type(value: &Value) -> Option<DataType> {
    match value {
        Value::Bool(_) => Some(DataType::Boolean),
        Value::Int(_) => Some(DataType::Int64),
        Value::Float(_) => Some(DataType::Float64),
        Value::String(_) => Some(DataType::Utf8),
        Value::Binary(_) => Some(DataType::Binary),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Remove the value at a dotted path from a value tree in place, pruning
/// now-empty intermediate objects along the way back out. A no-op if any
/// segment along the path is missing or not an object.
fn remove_path(value: &mut Value, segments: &[&str]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    let Value::Object(map) = value else { return None };

    if rest.is_empty() {
        return map.remove(*first);
    }

    let removed = {
        let child = map.get_mut(*first)?;
        remove_path(child, rest)
    };

    if removed.is_some() {
        if matches!(map.get(*first), Some(Value::Object(inner)) if inner.is_empty()) {
            map.remove(*first);
        }
    }
    removed
}
