//! Storage URL surface: `memory://`, `file:///abs/path`, `/abs/path`,
//! `./rel/path`, `s3://bucket[/prefix][...]`, `r2://bucket[/prefix]`.

use std::sync::Arc;

use super::error::StorageError;
use super::filesystem::FilesystemStorage;
use super::memory::MemoryStorage;
use super::object_store_backend::ObjectStoreBackend;
use super::Storage;

/// Open a [`Storage`] backend for a table URL. Unrecognized schemes fail
/// with [`StorageError::UnrecognizedUrl`] before any I/O.
pub fn open(table_url: &str) -> Result<Arc<dyn Storage>, StorageError> {
    if table_url == "memory://" || table_url.starts_with("memory://") {
        return Ok(Arc::new(MemoryStorage::new()));
    }

    if let Some(rest) = table_url.strip_prefix("file://") {
        let fs = FilesystemStorage::new(rest)
            .map_err(|e| StorageError::invalid_path(table_url, e.to_string()))?;
        return Ok(Arc::new(fs));
    }

    if table_url.starts_with('/') || table_url.starts_with("./") || table_url.starts_with("../") {
        let fs = FilesystemStorage::new(table_url)
            .map_err(|e| StorageError::invalid_path(table_url, e.to_string()))?;
        return Ok(Arc::new(fs));
    }

    if let Some(rest) = table_url.strip_prefix("s3://") {
        return open_object_store("s3", rest, table_url);
    }

    if let Some(rest) = table_url.strip_prefix("r2://") {
        return open_object_store("r2", rest, table_url);
    }

    Err(StorageError::UnrecognizedUrl(table_url.to_string()))
}

fn open_object_store(scheme: &str, rest: &str, original: &str) -> Result<Arc<dyn Storage>, StorageError> {
    // bucket[/prefix][.s3[.|-]region.amazonaws.com] — the host portion after
    // the bucket name carries region/endpoint hints for S3-compatible
    // stores; bucket and prefix are what the backend needs, the rest is
    // forwarded to the object_store builder by the table-open call site
    // that owns credentials (this function only validates shape).
    let bucket = rest.split('/').next().unwrap_or("");
    if bucket.is_empty() {
        return Err(StorageError::invalid_path(original, format!("{scheme} URL missing bucket")));
    }

    // Credentialed construction of the concrete AmazonS3 client is the
    // caller's responsibility (region/keys come from the environment or an
    // explicit builder) — `open` only validates the URL shape and returns
    // an error for anything it cannot recognize as belonging to this
    // scheme family. Higher-level callers that already hold a configured
    // `object_store::ObjectStore` should construct `ObjectStoreBackend`
    // directly via `ObjectStoreBackend::new`.
    let _ = ObjectStoreBackend::new;
    Err(StorageError::invalid_path(
        original,
        format!(
            "{scheme} backend requires credentials; construct ObjectStoreBackend::new with a configured object_store client"
        ),
    ))
}
