//! Adapter from the `object_store` crate (same project family as `arrow`
//! and `parquet`, already in the dependency tree) onto our [`Storage`]
//! trait. Backs the `s3://` and `r2://` URL schemes. ETags double as
//! version tokens; conditional writes map onto `object_store`'s
//! `PutMode::Create` / `PutMode::Update` preconditions, which in turn
//! compile down to S3's `If-None-Match` / `If-Match` headers.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    path::Path as ObjectPath, Error as OsError, ObjectStore as ObjectStoreTrait, PutMode,
    PutOptions, PutPayload, UpdateVersion,
};
use std::ops::Range;
use std::sync::Arc;

use super::error::StorageError;
use super::path::normalize_path;
use super::{Stat, Storage, VersionToken};

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStoreTrait>,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStoreTrait>) -> Self {
        Self { store }
    }

    fn object_path(path: &str) -> Result<ObjectPath, StorageError> {
        let normalized = normalize_path(path)?;
        Ok(ObjectPath::from(normalized))
    }
}

fn map_err(path: &str, err: OsError) -> StorageError {
    match err {
        OsError::NotFound { .. } => StorageError::FileNotFound(path.to_string()),
        OsError::Precondition { .. } | OsError::AlreadyExists { .. } => {
            StorageError::version_mismatch(path.to_string(), None, None)
        }
        OsError::PermissionDenied { .. } | OsError::Unauthenticated { .. } => {
            StorageError::PermissionDenied(path.to_string())
        }
        other => StorageError::ServiceUnavailable(other.to_string()),
    }
}

#[async_trait]
impl Storage for ObjectStoreBackend {
    async fn read(&self, path: &str) -> Result<Bytes, StorageError> {
        let op = Self::object_path(path)?;
        let result = self
            .store
            .get(&op)
            .await
            .map_err(|e| map_err(path, e))?;
        result.bytes().await.map_err(|e| map_err(path, e))
    }

    async fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Bytes, StorageError> {
        let op = Self::object_path(path)?;
        let meta = self.store.head(&op).await.map_err(|e| map_err(path, e))?;
        let len = meta.size as u64;
        let start = start.min(len);
        let end = end.min(len).max(start);
        if start == end {
            return Ok(Bytes::new());
        }
        let range: Range<usize> = (start as usize)..(end as usize);
        self.store
            .get_range(&op, range)
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        let op = Self::object_path(path)?;
        self.store
            .put(&op, PutPayload::from_bytes(data))
            .await
            .map_err(|e| map_err(path, e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        use futures::TryStreamExt;
        let prefix_norm = normalize_path(prefix)?;
        let op = ObjectPath::from(prefix_norm);
        let mut names: Vec<String> = self
            .store
            .list(Some(&op))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .map_err(|e| map_err(prefix, e))?;
        names.sort();
        Ok(names)
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let op = Self::object_path(path)?;
        match self.store.delete(&op).await {
            Ok(()) => Ok(()),
            Err(OsError::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_err(path, e)),
        }
    }

    async fn stat(&self, path: &str) -> Result<Option<Stat>, StorageError> {
        let op = Self::object_path(path)?;
        match self.store.head(&op).await {
            Ok(meta) => Ok(Some(Stat {
                size: meta.size as u64,
                last_modified_millis: meta.last_modified.timestamp_millis(),
                etag: meta.e_tag,
            })),
            Err(OsError::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_err(path, e)),
        }
    }

    async fn get_version(&self, path: &str) -> Result<Option<VersionToken>, StorageError> {
        Ok(self.stat(path).await?.and_then(|s| s.etag))
    }

    async fn write_conditional(
        &self,
        path: &str,
        data: Bytes,
        expected_version: Option<VersionToken>,
    ) -> Result<VersionToken, StorageError> {
        let op = Self::object_path(path)?;
        let mode = match expected_version.clone() {
            None => PutMode::Create,
            Some(e_tag) => PutMode::Update(UpdateVersion {
                e_tag: Some(e_tag),
                version: None,
            }),
        };
        let result = self
            .store
            .put_opts(
                &op,
                PutPayload::from_bytes(data),
                PutOptions::from(mode),
            )
            .await;

        match result {
            Ok(put_result) => Ok(put_result.e_tag.unwrap_or_default()),
            Err(OsError::AlreadyExists { .. }) | Err(OsError::Precondition { .. }) => {
                let actual = self.get_version(path).await?;
                Err(StorageError::version_mismatch(
                    path.to_string(),
                    expected_version,
                    actual,
                ))
            }
            Err(e) => Err(map_err(path, e)),
        }
    }
}
