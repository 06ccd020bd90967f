//! Storage abstraction with conditional (CAS) writes.
//!
//! Everything above this layer treats a table as a `path -> bytes`
//! keyspace with one extra primitive: [`Storage::write_conditional`], which
//! is what makes the optimistic commit protocol sound. Each backend
//! maps that primitive onto whatever compare-and-swap mechanism its medium
//! actually offers (ETag `If-Match`, atomic rename, or an in-process
//! counter) — see [`memory`], [`filesystem`], and [`object_store_backend`].

pub mod error;
pub mod filesystem;
pub mod memory;
pub mod object_store_backend;
pub mod path;
pub mod url;

pub use error::StorageError;

use async_trait::async_trait;
use bytes::Bytes;

/// Opaque, backend-specific compare-and-swap token (ETag, mtime, or an
/// in-process counter). No ordering is implied between different paths, or
/// even between tokens of different backends.
pub type VersionToken = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub size: u64,
    pub last_modified_millis: i64,
    pub etag: Option<String>,
}

/// Uniform blob interface every table operation is built on.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> Result<Bytes, StorageError>;

    /// Clamped to the file's actual length; a zero-length range returns
    /// an empty buffer rather than erroring.
    async fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Bytes, StorageError>;

    /// Unconditional upsert.
    async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError>;

    /// Files only — no synthetic directory markers — ordered lexicographically.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Idempotent: a no-op if the path is already absent.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    async fn stat(&self, path: &str) -> Result<Option<Stat>, StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.stat(path).await?.is_some())
    }

    async fn get_version(&self, path: &str) -> Result<Option<VersionToken>, StorageError>;

    /// Atomic create-if-absent / update-if-version-matches write.
    ///
    /// `expected_version: None` means "the blob must not exist yet". On
    /// success, returns the new version token. On conflict, returns
    /// [`StorageError::VersionMismatch`] carrying the token that actually
    /// won.
    async fn write_conditional(
        &self,
        path: &str,
        data: Bytes,
        expected_version: Option<VersionToken>,
    ) -> Result<VersionToken, StorageError>;
}
