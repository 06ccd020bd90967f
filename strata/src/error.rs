//! Crate-level error: every module's error rolled up into
//! one type for callers that don't want to match on `table::TableError`
//! directly, with the same `retryable()` convention each lower layer
//! already follows.

use thiserror::Error;

use crate::cdc::CdcError;
use crate::checkpoint::CheckpointError;
use crate::codec::error::CodecError;
use crate::log::error::LogError;
use crate::maintenance::MaintenanceError;
use crate::retry::Retryable;
use crate::snapshot::SnapshotError;
use crate::storage::error::StorageError;
use crate::table::error::TableError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Cdc(#[from] CdcError),

    #[error(transparent)]
    Maintenance(#[from] MaintenanceError),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl Error {
    pub fn retryable(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_retryable(),
            Error::Codec(e) => e.is_retryable(),
            Error::Log(e) => e.is_retryable(),
            Error::Checkpoint(e) => e.is_retryable(),
            Error::Snapshot(_) => false,
            Error::Cdc(e) => e.is_retryable(),
            Error::Maintenance(e) => e.is_retryable(),
            Error::Table(e) => e.is_retryable(),
        }
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        self.retryable()
    }
}
