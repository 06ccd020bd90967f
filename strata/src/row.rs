//! Dynamic row representation shared by the filter, codec, and table layers.
//!
//! Rows are heterogeneous documents, not reflected structs: a recursive
//! tagged value rather than a generic record type. Filters and projections
//! walk this tree directly; the columnar writer converts it to typed Arrow
//! columns via schema inference or an explicit [`Schema`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single cell or nested document value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Binary(#[serde(with = "bytes_b64")] Vec<u8>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

mod bytes_b64 {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up a dotted field path (`"doc.cat"`) within this value, treating
    /// non-object intermediates as a lookup failure (returns `None`, not an
    /// error — the filter layer treats a missing field as `undefined`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Set a dotted field path, creating intermediate objects as needed.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        let mut current = self;
        for (i, segment) in segments.iter().enumerate() {
            if !matches!(current, Value::Object(_)) {
                *current = Value::Object(BTreeMap::new());
            }
            let Value::Object(map) = current else { unreachable!() };
            if i == segments.len() - 1 {
                map.insert(segment.to_string(), value);
                return;
            }
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(BTreeMap::new()));
        }
    }

    /// Order this value against another for comparison operators. Returns
    /// `None` when the two values are not order-comparable (different
    /// variants, or either is `Null`) — callers treat that as "cannot skip /
    /// cannot match", never as a crash.
    pub fn partial_cmp_value(&self, other: &Value) -> Option<std::cmp::Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (String(a), String(b)) => a.partial_cmp(b),
            (Bool(a), Bool(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(_) | Value::Object(_) => {
                write!(f, "{}", serde_json::to_string(self).unwrap_or_default())
            }
        }
    }
}

/// A row is a top-level document: always an object at the root.
pub type Row = BTreeMap<String, Value>;

/// Primitive Arrow-representable data types a [`Schema`] field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Binary,
    TimestampMicros,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Stable column ID for column-mapping mode; `None` when mapping is off.
    #[serde(default)]
    pub column_id: Option<u64>,
}

/// A table schema: an ordered list of top-level fields. Nested/object
/// columns are represented as `DataType::Binary` carrying VARIANT-encoded
/// bytes (see `codec::variant`); the columnar writer may additionally shred
/// selected fields into typed sub-columns (see `codec::shred`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Infer a schema from a single row's shape. Used when a table's first
    /// write supplies no explicit schema.
    pub fn infer(row: &Row) -> Schema {
        let fields = row
            .iter()
            .map(|(name, value)| SchemaField {
                name: name.clone(),
                data_type: infer_type(value),
                nullable: value.is_null(),
                column_id: None,
            })
            .collect();
        Schema { fields }
    }

    /// Check that `row` conforms to this schema's shape. Extra or missing
    /// top-level keys, or a value whose inferred type disagrees with the
    /// declared type (for non-null values), is a mismatch.
    pub fn matches(&self, row: &Row) -> bool {
        if row.len() != self.fields.len() {
            return false;
        }
        for field in &self.fields {
            match row.get(&field.name) {
                None => return false,
                Some(Value::Null) => {
                    if !field.nullable {
                        return false;
                    }
                }
                Some(v) => {
                    if infer_type(v) != field.data_type {
                        return false;
                    }
                }
            }
        }
        true
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json_string(s: &str) -> Result<Schema, serde_json::Error> {
        serde_json::from_str(s)
    }
}

fn infer_type(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::Utf8,
        Value::Bool(_) => DataType::Boolean,
        Value::Int(_) => DataType::Int64,
        Value::Float(_) => DataType::Float64,
        Value::String(_) => DataType::Utf8,
        Value::Binary(_) => DataType::Binary,
        // Nested shapes are stored as VARIANT-encoded binary columns.
        Value::Array(_) | Value::Object(_) => DataType::Binary,
    }
}
