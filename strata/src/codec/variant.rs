//! VARIANT binary encoding.
//!
//! A VARIANT value is `{metadata, value}`: `metadata` is a deduplicated
//! dictionary of every field name seen anywhere in the value (including
//! nested objects), `value` is the tagged binary payload described below.
//!
//! Value tag bytes, exactly as specified:
//! null `0x00`, true `0x04`, false `0x08`, int8 `0x0C`, int16 `0x10`,
//! int32 `0x14`, int64 `0x18`, double `0x1C`, timestamp-µs `0x30`,
//! binary `0x3C`, long string `0x40`. Short strings and containers use the
//! low 2 bits of the header byte as a `basic_type` discriminator
//! (`1` = short string, `2` = object, `3` = array); a short string packs
//! its length (≤ 63) into the remaining 6 bits, and object/array headers
//! carry one extra "large" bit selecting a 1- or 4-byte element count.

use std::collections::BTreeMap;

use super::error::CodecError;
use crate::row::Value;

const TAG_NULL: u8 = 0x00;
const TAG_TRUE: u8 = 0x04;
const TAG_FALSE: u8 = 0x08;
const TAG_INT8: u8 = 0x0C;
const TAG_INT16: u8 = 0x10;
const TAG_INT32: u8 = 0x14;
const TAG_INT64: u8 = 0x18;
const TAG_DOUBLE: u8 = 0x1C;
const TAG_TIMESTAMP_US: u8 = 0x30;
const TAG_BINARY: u8 = 0x3C;
const TAG_LONG_STRING: u8 = 0x40;

const BASIC_SHORT_STRING: u8 = 1;
const BASIC_OBJECT: u8 = 2;
const BASIC_ARRAY: u8 = 3;
const LARGE_FLAG: u8 = 0x04;

/// Encoded VARIANT: a metadata dictionary and a value payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVariant {
    pub metadata: Vec<u8>,
    pub value: Vec<u8>,
}

/// Metadata dictionary builder: deduplicates field names in first-seen
/// order, appending new names rather than reordering existing ones so
/// offsets already handed out stay valid.
#[derive(Default)]
struct Dictionary {
    names: Vec<String>,
    index: BTreeMap<String, u32>,
}

impl Dictionary {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    fn collect(value: &Value, dict: &mut Dictionary) {
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    dict.intern(k);
                    Self::collect(v, dict);
                }
            }
            Value::Array(items) => {
                for item in items {
                    Self::collect(item, dict);
                }
            }
            _ => {}
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = vec![0x01u8]; // version-1 header
        out.extend((self.names.len() as u32).to_le_bytes());
        for name in &self.names {
            let bytes = name.as_bytes();
            out.extend((bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Vec<String>, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::validation("truncated variant metadata"));
        }
        let version = bytes[0] & 0x0F;
        if version != 1 {
            return Err(CodecError::validation(format!("unsupported metadata version {version}")));
        }
        let mut cursor = 1usize;
        let count = read_u32(bytes, &mut cursor)?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = read_u32(bytes, &mut cursor)? as usize;
            let slice = read_slice(bytes, &mut cursor, len)?;
            names.push(
                String::from_utf8(slice.to_vec())
                    .map_err(|e| CodecError::validation(e.to_string()))?,
            );
        }
        Ok(names)
    }
}

/// Encode a row value tree into `{metadata, value}`.
pub fn encode_variant(value: &Value) -> EncodedVariant {
    let mut dict = Dictionary::default();
    Dictionary::collect(value, &mut dict);
    let metadata = dict.encode();
    let mut out = Vec::new();
    encode_value(value, &dict, &mut out);
    EncodedVariant { metadata, value: out }
}

fn encode_value(value: &Value, dict: &Dictionary, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Int(i) => encode_int(*i, out),
        Value::Float(f) => encode_float(*f, out),
        Value::String(s) => encode_string(s, out),
        Value::Binary(b) => {
            out.push(TAG_BINARY);
            out.extend((b.len() as i32).to_le_bytes());
            out.extend_from_slice(b);
        }
        Value::Array(items) => {
            let large = items.len() > 255;
            out.push(BASIC_ARRAY | if large { LARGE_FLAG } else { 0 });
            write_count(items.len(), large, out);
            for item in items {
                encode_value(item, dict, out);
            }
        }
        Value::Object(map) => {
            let large = map.len() > 255;
            out.push(BASIC_OBJECT | if large { LARGE_FLAG } else { 0 });
            write_count(map.len(), large, out);
            for (k, v) in map {
                let id = *dict.index.get(k).expect("collected during dictionary pass");
                out.extend(id.to_le_bytes());
                encode_value(v, dict, out);
            }
        }
    }
}

/// Timestamp values are represented as `Value::Int` carrying microseconds
/// since epoch, tagged separately via [`encode_timestamp_micros`] — the row
/// tree has no dedicated timestamp variant, matching spec's note that the
/// tag is chosen at encode time rather than carried in the logical value.
pub fn encode_timestamp_micros(micros: i64, out: &mut Vec<u8>) {
    out.push(TAG_TIMESTAMP_US);
    out.extend(micros.to_le_bytes());
}

fn encode_int(i: i64, out: &mut Vec<u8>) {
    if let Ok(v) = i8::try_from(i) {
        out.push(TAG_INT8);
        out.push(v as u8);
    } else if let Ok(v) = i16::try_from(i) {
        out.push(TAG_INT16);
        out.extend(v.to_le_bytes());
    } else if let Ok(v) = i32::try_from(i) {
        out.push(TAG_INT32);
        out.extend(v.to_le_bytes());
    } else {
        out.push(TAG_INT64);
        out.extend(i.to_le_bytes());
    }
}

fn encode_float(f: f64, out: &mut Vec<u8>) {
    // Integer-valued, finite doubles collapse to the smallest integer
    // encoding that fits (documented precision loss: `-0.0` and any other
    // integer-valued double round-trip as `Value::Int`, not `Value::Float`).
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        encode_int(f as i64, out);
        return;
    }
    out.push(TAG_DOUBLE);
    out.extend(f.to_bits().to_le_bytes());
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    if bytes.len() <= 63 {
        out.push(((bytes.len() as u8) << 2) | BASIC_SHORT_STRING);
        out.extend_from_slice(bytes);
    } else {
        out.push(TAG_LONG_STRING);
        out.extend((bytes.len() as i32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
}

fn write_count(count: usize, large: bool, out: &mut Vec<u8>) {
    if large {
        out.extend((count as u32).to_le_bytes());
    } else {
        out.push(count as u8);
    }
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8, CodecError> {
    let b = *bytes
        .get(*cursor)
        .ok_or_else(|| CodecError::validation("truncated variant value"))?;
    *cursor += 1;
    Ok(b)
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], CodecError> {
    let end = cursor
        .checked_add(len)
        .ok_or_else(|| CodecError::validation("variant length overflow"))?;
    let slice = bytes
        .get(*cursor..end)
        .ok_or_else(|| CodecError::validation("truncated variant value"))?;
    *cursor = end;
    Ok(slice)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, CodecError> {
    let slice = read_slice(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_i32(bytes: &[u8], cursor: &mut usize) -> Result<i32, CodecError> {
    let slice = read_slice(bytes, cursor, 4)?;
    Ok(i32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_i64(bytes: &[u8], cursor: &mut usize) -> Result<i64, CodecError> {
    let slice = read_slice(bytes, cursor, 8)?;
    Ok(i64::from_le_bytes(slice.try_into().unwrap()))
}

/// Decode `{metadata, value}` back into a row value tree. Truncated inputs
/// raise [`CodecError::Validation`]; unknown type tags decode as `Null`
/// rather than erroring, per spec.
pub fn decode_variant(metadata: &[u8], value: &[u8]) -> Result<Value, CodecError> {
    let names = Dictionary::decode(metadata)?;
    let mut cursor = 0usize;
    let result = decode_value(value, &mut cursor, &names)?;
    Ok(result)
}

fn decode_value(bytes: &[u8], cursor: &mut usize, names: &[String]) -> Result<Value, CodecError> {
    let header = read_u8(bytes, cursor)?;
    let basic_type = header & 0x03;

    if basic_type == BASIC_SHORT_STRING {
        let len = (header >> 2) as usize;
        let slice = read_slice(bytes, cursor, len)?;
        return Ok(Value::String(
            String::from_utf8(slice.to_vec()).map_err(|e| CodecError::validation(e.to_string()))?,
        ));
    }

    if basic_type == BASIC_OBJECT {
        let large = header & LARGE_FLAG != 0;
        let count = if large {
            read_u32(bytes, cursor)? as usize
        } else {
            read_u8(bytes, cursor)? as usize
        };
        let mut map = std::collections::BTreeMap::new();
        for _ in 0..count {
            let id = read_u32(bytes, cursor)? as usize;
            let name = names
                .get(id)
                .ok_or_else(|| CodecError::validation("dictionary id out of range"))?
                .clone();
            let v = decode_value(bytes, cursor, names)?;
            map.insert(name, v);
        }
        return Ok(Value::Object(map));
    }

    if basic_type == BASIC_ARRAY {
        let large = header & LARGE_FLAG != 0;
        let count = if large {
            read_u32(bytes, cursor)? as usize
        } else {
            read_u8(bytes, cursor)? as usize
        };
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(decode_value(bytes, cursor, names)?);
        }
        return Ok(Value::Array(items));
    }

    // basic_type == 0: primitive, discriminated by the full header byte.
    match header {
        TAG_NULL => Ok(Value::Null),
        TAG_TRUE => Ok(Value::Bool(true)),
        TAG_FALSE => Ok(Value::Bool(false)),
        TAG_INT8 => Ok(Value::Int(read_u8(bytes, cursor)? as i8 as i64)),
        TAG_INT16 => {
            let slice = read_slice(bytes, cursor, 2)?;
            Ok(Value::Int(i16::from_le_bytes(slice.try_into().unwrap()) as i64))
        }
        TAG_INT32 => Ok(Value::Int(read_i32(bytes, cursor)? as i64)),
        TAG_INT64 => Ok(Value::Int(read_i64(bytes, cursor)?)),
        TAG_DOUBLE => {
            let slice = read_slice(bytes, cursor, 8)?;
            Ok(Value::Float(f64::from_bits(u64::from_le_bytes(slice.try_into().unwrap()))))
        }
        TAG_TIMESTAMP_US => Ok(Value::Int(read_i64(bytes, cursor)?)),
        TAG_BINARY => {
            let len = read_i32(bytes, cursor)? as usize;
            let slice = read_slice(bytes, cursor, len)?;
            Ok(Value::Binary(slice.to_vec()))
        }
        TAG_LONG_STRING => {
            let len = read_i32(bytes, cursor)? as usize;
            let slice = read_slice(bytes, cursor, len)?;
            Ok(Value::String(
                String::from_utf8(slice.to_vec()).map_err(|e| CodecError::validation(e.to_string()))?,
            ))
        }
        // Unknown type tag: decode as null rather than erroring.
        _ => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn round_trip(value: Value) -> Value {
        let encoded = encode_variant(&value);
        decode_variant(&encoded.metadata, &encoded.value).unwrap()
    }

    #[test]
    fn primitives_round_trip() {
        assert_eq!(round_trip(Value::Null), Value::Null);
        assert_eq!(round_trip(Value::Bool(true)), Value::Bool(true));
        assert_eq!(round_trip(Value::Bool(false)), Value::Bool(false));
        assert_eq!(round_trip(Value::Int(42)), Value::Int(42));
        assert_eq!(round_trip(Value::Int(-42)), Value::Int(-42));
        assert_eq!(round_trip(Value::Int(i64::MAX)), Value::Int(i64::MAX));
        assert_eq!(round_trip(Value::Int(i64::MIN)), Value::Int(i64::MIN));
        assert_eq!(round_trip(Value::String("hello".into())), Value::String("hello".into()));
        assert_eq!(round_trip(Value::Binary(vec![1, 2, 3])), Value::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn long_string_round_trips() {
        let long = "x".repeat(1000);
        assert_eq!(round_trip(Value::String(long.clone())), Value::String(long));
    }

    #[test]
    fn nan_and_infinity_round_trip_bit_exact() {
        let nan = round_trip(Value::Float(f64::NAN));
        match nan {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
        assert_eq!(round_trip(Value::Float(f64::INFINITY)), Value::Float(f64::INFINITY));
        assert_eq!(round_trip(Value::Float(f64::NEG_INFINITY)), Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn negative_zero_collapses_to_integer_zero() {
        assert_eq!(round_trip(Value::Float(-0.0)), Value::Int(0));
    }

    #[test]
    fn integer_valued_double_round_trips_as_int() {
        assert_eq!(round_trip(Value::Float(100.0)), Value::Int(100));
    }

    #[test]
    fn fractional_double_round_trips_as_double() {
        assert_eq!(round_trip(Value::Float(1.5)), Value::Float(1.5));
    }

    #[test]
    fn nested_object_and_array_round_trip() {
        let mut doc = BTreeMap::new();
        doc.insert("cat".to_string(), Value::String("A".into()));
        doc.insert("price".to_string(), Value::Int(100));
        doc.insert(
            "tags".to_string(),
            Value::Array(vec![Value::String("x".into()), Value::String("y".into())]),
        );
        let value = Value::Object(doc);
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn dictionary_deduplicates_repeated_names() {
        let mut inner1 = BTreeMap::new();
        inner1.insert("k".to_string(), Value::Int(1));
        let mut inner2 = BTreeMap::new();
        inner2.insert("k".to_string(), Value::Int(2));
        let value = Value::Array(vec![Value::Object(inner1), Value::Object(inner2)]);
        let encoded = encode_variant(&value);
        let names = Dictionary::decode(&encoded.metadata).unwrap();
        assert_eq!(names, vec!["k".to_string()]);
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn truncated_value_is_validation_error() {
        let encoded = encode_variant(&Value::Int(300));
        let truncated = &encoded.value[..encoded.value.len() - 1];
        let err = decode_variant(&encoded.metadata, truncated).unwrap_err();
        assert!(matches!(err, CodecError::Validation(_)));
    }

    #[test]
    fn unknown_tag_decodes_as_null() {
        let metadata = Dictionary::default().encode();
        let value = vec![0xFFu8];
        assert_eq!(decode_variant(&metadata, &value).unwrap(), Value::Null);
    }
}
