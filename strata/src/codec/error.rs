use thiserror::Error;

use crate::retry::Retryable;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("writer aborted")]
    Aborted,
}

impl CodecError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CodecError::Validation(msg.into())
    }
}

impl Retryable for CodecError {
    fn is_retryable(&self) -> bool {
        false
    }
}
