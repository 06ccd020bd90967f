//! Encoding layer: the VARIANT binary format, row-group zone maps,
//! VARIANT shredding, deletion vectors, file-path utilities, and the
//! columnar (Parquet-backed) data file reader/writer.

pub mod columnar;
pub mod deletion_vector;
pub mod error;
pub mod path;
pub mod shred;
pub mod variant;
pub mod zonemap;

pub use error::CodecError;
pub use variant::{decode_variant, encode_variant, EncodedVariant};
pub use zonemap::{ColumnStats, ComparisonOp, ZoneMap, ZoneMapBuilder};
