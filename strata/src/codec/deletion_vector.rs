//! Deletion vectors: a compact row-level "soft delete" marker
//! attached to an `Add` action, avoiding a full file rewrite for isolated
//! row removals. The on-disk bitmap is a standard
//! [Roaring](https://roaringbitmap.org) bitmap; small vectors may be
//! inlined directly into the log entry, Z85-encoded the same way Delta's
//! deletion-vector descriptor packs a UUID-derived side-file path.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::error::CodecError;

const Z85_ALPHABET: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

/// Z85-encode a byte slice. The input length must be a multiple of 4 (the
/// standard Z85 constraint); callers pad with trailing zero bytes and track
/// the true length separately (`size_in_bytes` on the descriptor).
pub fn z85_encode(bytes: &[u8]) -> Result<String, CodecError> {
    if bytes.len() % 4 != 0 {
        return Err(CodecError::validation("z85 input length must be a multiple of 4"));
    }
    let mut out = String::with_capacity(bytes.len() / 4 * 5);
    for chunk in bytes.chunks(4) {
        let mut value: u32 = 0;
        for &b in chunk {
            value = (value << 8) | b as u32;
        }
        let mut chars = [0u8; 5];
        for i in (0..5).rev() {
            chars[i] = Z85_ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        out.push_str(std::str::from_utf8(&chars).unwrap());
    }
    Ok(out)
}

/// Decode a Z85 string back to raw bytes. The input length must be a
/// multiple of 5.
pub fn z85_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    if s.len() % 5 != 0 {
        return Err(CodecError::validation("z85 input length must be a multiple of 5"));
    }
    let mut lookup = [255u8; 256];
    for (i, &c) in Z85_ALPHABET.iter().enumerate() {
        lookup[c as usize] = i as u8;
    }
    let mut out = Vec::with_capacity(s.len() / 5 * 4);
    for chunk in s.as_bytes().chunks(5) {
        let mut value: u32 = 0;
        for &c in chunk {
            let digit = lookup[c as usize];
            if digit == 255 {
                return Err(CodecError::validation("invalid z85 character"));
            }
            value = value
                .checked_mul(85)
                .and_then(|v| v.checked_add(digit as u32))
                .ok_or_else(|| CodecError::validation("z85 chunk overflow"))?;
        }
        out.extend(value.to_be_bytes());
    }
    Ok(out)
}

/// Where a deletion vector's bitmap bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeletionVectorStorage {
    /// Bitmap bytes (Z85-encoded, zero-padded to a multiple of 4) carried
    /// directly in the log entry.
    Inline { z85: String },
    /// Bitmap bytes live in a side file at `relative_path`, at `offset`
    /// for `size_in_bytes` bytes.
    OnDisk {
        relative_path: String,
        offset: u32,
        size_in_bytes: u32,
    },
}

/// The log-entry-level descriptor: storage location plus the cardinality
/// (row count) callers can use without reading the bitmap at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionVectorDescriptor {
    pub storage: DeletionVectorStorage,
    pub cardinality: u64,
}

impl DeletionVectorDescriptor {
    /// Build an inline descriptor from serialized bitmap bytes.
    pub fn inline(serialized: &[u8], cardinality: u64) -> Result<Self, CodecError> {
        let mut padded = serialized.to_vec();
        while padded.len() % 4 != 0 {
            padded.push(0);
        }
        Ok(Self {
            storage: DeletionVectorStorage::Inline { z85: z85_encode(&padded)? },
            cardinality,
        })
    }

    pub fn on_disk(relative_path: impl Into<String>, offset: u32, size_in_bytes: u32, cardinality: u64) -> Self {
        Self {
            storage: DeletionVectorStorage::OnDisk {
                relative_path: relative_path.into(),
                offset,
                size_in_bytes,
            },
            cardinality,
        }
    }
}

/// A decoded deletion vector: the set of row indices (within a data file,
/// by physical row order) that are logically deleted.
pub struct DeletionVector {
    bitmap: RoaringBitmap,
}

impl DeletionVector {
    pub fn from_bitmap(bitmap: RoaringBitmap) -> Self {
        Self { bitmap }
    }

    pub fn from_row_indices(indices: impl IntoIterator<Item = u32>) -> Self {
        let mut bitmap = RoaringBitmap::new();
        for i in indices {
            bitmap.insert(i);
        }
        Self { bitmap }
    }

    pub fn contains(&self, row_index: u32) -> bool {
        self.bitmap.contains(row_index)
    }

    pub fn cardinality(&self) -> u64 {
        self.bitmap.len()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.bitmap
            .serialize_into(&mut out)
            .map_err(|e| CodecError::validation(e.to_string()))?;
        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        let bitmap = RoaringBitmap::deserialize_from(bytes)
            .map_err(|e| CodecError::validation(e.to_string()))?;
        Ok(Self { bitmap })
    }

    /// Decode an inline descriptor's bitmap directly, without any I/O.
    /// `OnDisk` descriptors require the caller to fetch `size_in_bytes`
    /// bytes at `offset` from `relative_path` via [`crate::storage::Storage`]
    /// and pass them to [`DeletionVector::deserialize`].
    pub fn from_inline_descriptor(descriptor: &DeletionVectorDescriptor) -> Result<Self, CodecError> {
        match &descriptor.storage {
            DeletionVectorStorage::Inline { z85 } => {
                let bytes = z85_decode(z85)?;
                Self::deserialize(&bytes)
            }
            DeletionVectorStorage::OnDisk { .. } => Err(CodecError::validation(
                "on-disk deletion vector requires a storage read; use deserialize() with fetched bytes",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z85_round_trips_arbitrary_four_byte_multiple() {
        let bytes = b"\x86\x4F\xD2\x6F\xB5\x59\xF7\x5B".to_vec();
        let encoded = z85_encode(&bytes).unwrap();
        assert_eq!(encoded.len(), bytes.len() / 4 * 5);
        assert_eq!(z85_decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn z85_rejects_misaligned_input() {
        assert!(z85_encode(&[1, 2, 3]).is_err());
        assert!(z85_decode("abc").is_err());
    }

    #[test]
    fn bitmap_round_trips_through_serialize() {
        let dv = DeletionVector::from_row_indices([1, 4, 9, 1000]);
        let bytes = dv.serialize().unwrap();
        let restored = DeletionVector::deserialize(&bytes).unwrap();
        assert_eq!(restored.cardinality(), 4);
        assert!(restored.contains(9));
        assert!(!restored.contains(2));
    }

    #[test]
    fn inline_descriptor_round_trips() {
        let dv = DeletionVector::from_row_indices([0, 2, 5]);
        let bytes = dv.serialize().unwrap();
        let descriptor = DeletionVectorDescriptor::inline(&bytes, dv.cardinality()).unwrap();
        let restored = DeletionVector::from_inline_descriptor(&descriptor).unwrap();
        assert_eq!(restored.cardinality(), 3);
        assert!(restored.contains(5));
    }

    #[test]
    fn on_disk_descriptor_refuses_direct_decode() {
        let descriptor = DeletionVectorDescriptor::on_disk("dv/abc.bin", 0, 128, 3);
        let err = DeletionVector::from_inline_descriptor(&descriptor).unwrap_err();
        assert!(matches!(err, CodecError::Validation(_)));
    }
}
