//! Local filesystem storage backend.
//!
//! CAS is implemented with an atomic-rename protocol (write to a `.tmp`
//! staging path, then `rename` into place) guarded by an `fs2` advisory
//! lock on a sibling `.lock` file for the read-check-write sequence, which
//! gives cross-process mutual exclusion without a separate lock service.
//! The version token is the file's mtime in milliseconds; because two
//! writes within the same millisecond would otherwise produce identical
//! tokens, the backend bumps the token forward by at least one millisecond
//! past the previous value when necessary.

use async_trait::async_trait;
use bytes::Bytes;
use fs2::FileExt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::StorageError;
use super::path::normalize_path;
use super::{Stat, Storage, VersionToken};

pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    pub fn new(base_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let normalized = normalize_path(path)?;
        Ok(self.base_path.join(normalized))
    }

    fn lock_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    fn mtime_millis(meta: &fs::Metadata) -> i64 {
        meta.modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn current_token(target: &Path) -> Result<Option<(VersionToken, i64)>, StorageError> {
        match fs::metadata(target) {
            Ok(meta) => {
                let millis = Self::mtime_millis(&meta);
                Ok(Some((millis.to_string(), millis)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_mtime_at_least(target: &Path, floor_millis: i64) -> Result<VersionToken, StorageError> {
        let meta = fs::metadata(target)?;
        let mut millis = Self::mtime_millis(&meta);
        if millis <= floor_millis {
            millis = floor_millis + 1;
            let new_time = SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(millis as u64);
            let file = fs::OpenOptions::new().write(true).open(target)?;
            file.set_modified(new_time)?;
        }
        Ok(millis.to_string())
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    async fn read(&self, path: &str) -> Result<Bytes, StorageError> {
        let target = self.resolve(path)?;
        match fs::read(&target) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_range(&self, path: &str, start: u64, end: u64) -> Result<Bytes, StorageError> {
        let data = self.read(path).await?;
        let len = data.len() as u64;
        let start = start.min(len);
        let end = end.min(len).max(start);
        Ok(data.slice(start as usize..end as usize))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = target.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&data)?;
        }
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix_norm = normalize_path(prefix)?;
        let mut results = Vec::new();
        walk(&self.base_path, &self.base_path, &mut results)?;
        results.retain(|p| p.starts_with(&prefix_norm));
        results.sort();
        Ok(results)
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn stat(&self, path: &str) -> Result<Option<Stat>, StorageError> {
        let target = self.resolve(path)?;
        match fs::metadata(&target) {
            Ok(meta) => Ok(Some(Stat {
                size: meta.len(),
                last_modified_millis: Self::mtime_millis(&meta),
                etag: Some(Self::mtime_millis(&meta).to_string()),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_version(&self, path: &str) -> Result<Option<VersionToken>, StorageError> {
        let target = self.resolve(path)?;
        Ok(Self::current_token(&target)?.map(|(tok, _)| tok))
    }

    async fn write_conditional(
        &self,
        path: &str,
        data: Bytes,
        expected_version: Option<VersionToken>,
    ) -> Result<VersionToken, StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_path = Self::lock_path(&target);
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file.lock_exclusive()?;

        let result = (|| {
            let current = Self::current_token(&target)?;
            let current_tok = current.as_ref().map(|(tok, _)| tok.clone());
            if current_tok != expected_version {
                return Err(StorageError::version_mismatch(
                    path.to_string(),
                    expected_version.clone(),
                    current_tok,
                ));
            }

            let floor = current.map(|(_, millis)| millis).unwrap_or(i64::MIN);
            let tmp = target.with_extension("tmp");
            {
                let mut f = fs::File::create(&tmp)?;
                f.write_all(&data)?;
            }
            fs::rename(&tmp, &target)?;
            Self::set_mtime_at_least(&target, floor)
        })();

        lock_file.unlock()?;
        result
    }
}

fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), StorageError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(base, &path, out)?;
        } else if file_type.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(".tmp") || name.ends_with(".lock") {
                    continue;
                }
            }
            if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}
