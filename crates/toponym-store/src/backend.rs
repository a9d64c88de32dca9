//! Key-value storage backends.
//!
//! The pipeline needs two durability guarantees from its persistence layer:
//! atomic single-record writes and atomic whole-checkpoint writes. Both are
//! expressed through [`StorageBackend`]; the filesystem implementation gets
//! atomicity from write-to-temp-then-rename.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use toponym_core::{Error, Result};

/// Storage backend abstraction over string keys.
///
/// Keys are slash-separated paths (`records/rec-000042.json`). Writes must
/// be atomic: a reader never observes a partially written value.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Atomically write `data` at `key`, replacing any existing value.
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read the value at `key`. `Error::Store` if absent.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Check whether a value exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete the value at `key`, if present.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically move the value at `from` to `to`.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// List keys under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Filesystem backend
// ---------------------------------------------------------------------------

/// Filesystem storage backend rooted at a base directory.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.full_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write to a temp file in the same directory, then rename over the
        // target: readers see either the old value or the new one, never a
        // torn write.
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.full_path(key);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::Store(format!("key not found: {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::try_exists(self.full_path(key)).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.full_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let to_path = self.full_path(to);
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(self.full_path(from), to_path).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.full_path(prefix);
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                keys.push(format!("{prefix}/{}", entry.file_name().to_string_lossy()));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-memory backend for tests. Writes are atomic under the map lock.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| Error::Store("memory backend lock poisoned".into()))?
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .map_err(|_| Error::Store("memory backend lock poisoned".into()))?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Store(format!("key not found: {key}")))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| Error::Store("memory backend lock poisoned".into()))?
            .contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| Error::Store("memory backend lock poisoned".into()))?
            .remove(key);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Store("memory backend lock poisoned".into()))?;
        let value = entries
            .remove(from)
            .ok_or_else(|| Error::Store(format!("key not found: {from}")))?;
        entries.insert(to.to_string(), value);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let want = format!("{prefix}/");
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map_err(|_| Error::Store("memory backend lock poisoned".into()))?
            .keys()
            .filter(|k| k.starts_with(&want))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
