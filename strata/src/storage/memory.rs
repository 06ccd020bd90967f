//! In-process memory storage backend. Version tokens are a per-key atomic
//! counter, kept in a small, explicit in-memory map guarded by
//! `parking_lot` — the filesystem backend takes the analogous approach on
//! disk with a file lock.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::error::StorageError;
use super::path::normalize_path;
use super::{Stat, Storage, VersionToken};

struct Entry {
    data: Bytes,
    version: u64,
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, path: &str) -> Result<Bytes, StorageError> {
        let path = normalize_path(path)?;
        let entries = self.entries.read();
        entries
            .get(&path)
            .map(|e| e.data.clone())
            .ok_or_else(|| StorageError::FileNotFound(path))
    }

    async fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Bytes, StorageError> {
        let data = self.read(path).await?;
        let len = data.len() as u64;
        let start = start.min(len);
        let end = end.min(len).max(start);
        Ok(data.slice(start as usize..end as usize))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        let path = normalize_path(path)?;
        let mut entries = self.entries.write();
        let version = entries.get(&path).map(|e| e.version + 1).unwrap_or(0);
        entries.insert(path, Entry { data, version });
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = normalize_path(prefix)?;
        let entries = self.entries.read();
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let path = normalize_path(path)?;
        self.entries.write().remove(&path);
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<Stat>, StorageError> {
        let path = normalize_path(path)?;
        let entries = self.entries.read();
        Ok(entries.get(&path).map(|e| Stat {
            size: e.data.len() as u64,
            last_modified_millis: 0,
            etag: Some(e.version.to_string()),
        }))
    }

    async fn get_version(&self, path: &str) -> Result<Option<VersionToken>, StorageError> {
        let path = normalize_path(path)?;
        let entries = self.entries.read();
        Ok(entries.get(&path).map(|e| e.version.to_string()))
    }

    async fn write_conditional(
        &self,
        path: &str,
        data: Bytes,
        expected_version: Option<VersionToken>,
    ) -> Result<VersionToken, StorageError> {
        let norm = normalize_path(path)?;
        let mut entries = self.entries.write();
        let current = entries.get(&norm).map(|e| e.version.to_string());

        if current != expected_version {
            return Err(StorageError::version_mismatch(norm, expected_version, current));
        }

        let version = current
            .map(|v| v.parse::<u64>().unwrap_or(0) + 1)
            .unwrap_or(0);
        entries.insert(norm, Entry { data, version });
        Ok(version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract_tests::*;
    use super::*;

    #[tokio::test]
    async fn contract() {
        let s = MemoryStorage::new();
        round_trip(&s).await;
        read_range_clamps(&s).await;
        conditional_write_cas(&s).await;
        delete_is_idempotent(&s).await;
        list_returns_sorted_files(&s).await;
    }

    #[tokio::test]
    async fn rejects_path_traversal_before_any_io() {
        let s = MemoryStorage::new();
        let err = s.write("../escape", Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
        assert!(s.list("").await.unwrap().is_empty());
    }
}
