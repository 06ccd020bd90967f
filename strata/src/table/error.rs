//! Table-engine errors: the error surface every public `Table` method
//! returns. Wraps each lower-layer error as a variant, the same shape
//! `strata::Error` uses one level up, plus the table-specific kinds
//! that don't belong to any single lower layer (`ConcurrencyError`,
//! schema mismatch, "no row matched a mutating filter").

use thiserror::Error;

use crate::cdc::CdcError;
use crate::checkpoint::CheckpointError;
use crate::codec::error::CodecError;
use crate::log::error::LogError;
use crate::maintenance::MaintenanceError;
use crate::retry::Retryable;
use crate::snapshot::SnapshotError;
use crate::storage::error::StorageError;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("transaction log error: {0}")]
    Log(#[from] LogError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("cdc error: {0}")]
    Cdc(#[from] CdcError),

    #[error("maintenance error: {0}")]
    Maintenance(#[from] MaintenanceError),

    #[error("optimistic commit conflict: expected version {expected:?}, actual {actual:?}")]
    Concurrency { expected: Option<u64>, actual: Option<u64> },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("row does not match the table schema: {0}")]
    SchemaMismatch(String),

    #[error("no row matched the given filter")]
    NoMatch,

    #[error("table already exists")]
    AlreadyExists,

    #[error("table does not exist at this location")]
    NotFound,

    #[error("operation aborted")]
    Aborted,
}

impl TableError {
    pub fn retryable(&self) -> bool {
        match self {
            TableError::Storage(e) => e.is_retryable(),
            TableError::Log(e) => e.is_retryable(),
            TableError::Checkpoint(e) => e.is_retryable(),
            TableError::Maintenance(e) => e.is_retryable(),
            TableError::Concurrency { .. } => true,
            _ => false,
        }
    }
}

impl Retryable for TableError {
    fn is_retryable(&self) -> bool {
        self.retryable()
    }
}
