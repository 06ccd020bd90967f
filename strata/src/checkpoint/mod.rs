//! Checkpoints & log cleanup: a checkpoint collapses the live action
//! set at some version into one or more Parquet files so a snapshot load
//! doesn't have to replay the whole log from version 0; `_last_checkpoint`
//! points at the most recent one.

pub mod cleanup;
pub mod error;
pub mod last_checkpoint;
pub mod policy;
pub mod reader;
pub mod row_codec;
pub mod writer;

pub use cleanup::{cleanable_versions, delete_versions};
pub use error::CheckpointError;
pub use last_checkpoint::{read_last_checkpoint, write_last_checkpoint, LastCheckpoint};
pub use policy::CheckpointPolicy;
pub use reader::read_checkpoint;
pub use writer::{write_checkpoint, CheckpointPart};
