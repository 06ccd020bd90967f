//! CDC errors: `{code, message}` where retryability follows the code.

use thiserror::Error;

use crate::retry::Retryable;
use crate::storage::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcErrorCode {
    TableNotFound,
    InvalidVersionRange,
    InvalidTimeRange,
    CdcNotEnabled,
    StorageError,
    ParseError,
    EmptyWrite,
}

#[derive(Error, Debug)]
pub enum CdcError {
    #[error("table not found")]
    TableNotFound,

    #[error("invalid version range: start {start} > end {end}")]
    InvalidVersionRange { start: u64, end: u64 },

    #[error("invalid time range: start {start} > end {end}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("change data feed is not enabled for this table")]
    CdcNotEnabled,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to parse CDC file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("cannot write a CDC file with zero records")]
    EmptyWrite,
}

impl CdcError {
    pub fn code(&self) -> CdcErrorCode {
        match self {
            CdcError::TableNotFound => CdcErrorCode::TableNotFound,
            CdcError::InvalidVersionRange { .. } => CdcErrorCode::InvalidVersionRange,
            CdcError::InvalidTimeRange { .. } => CdcErrorCode::InvalidTimeRange,
            CdcError::CdcNotEnabled => CdcErrorCode::CdcNotEnabled,
            CdcError::Storage(_) => CdcErrorCode::StorageError,
            CdcError::Parse { .. } => CdcErrorCode::ParseError,
            CdcError::EmptyWrite => CdcErrorCode::EmptyWrite,
        }
    }
}

impl Retryable for CdcError {
    fn is_retryable(&self) -> bool {
        matches!(self, CdcError::Storage(e) if e.is_retryable())
    }
}
