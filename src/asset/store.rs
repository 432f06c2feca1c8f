//! Remote object storage
//!
//! The pipeline only needs two calls from a bucket: an existence check and
//! an upload. Both are keyed by the full object key.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Storage failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Key would escape the store or is otherwise unusable
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    /// Remote rejected or failed the request
    #[error("Storage request failed: {0}")]
    Request(String),
}

impl StoreError {
    pub fn io(key: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }
}

/// Bucket-style object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists under `key`
    async fn head_object(&self, key: &str) -> Result<bool, StoreError>;

    /// Store `bytes` under `key`, overwriting any existing object
    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// In-process store, used for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put_object` calls served so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match self.lock() {
            Ok(objects) => objects.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        keys.sort();
        keys
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, StoreError> {
        self.objects
            .lock()
            .map_err(|_| StoreError::request("memory store poisoned"))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head_object(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.contains_key(key))
    }

    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.lock()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Store that mirrors bucket keys to files under a root directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a key; only plain relative components are accepted
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !plain {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn head_object(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(key, e))
    }

    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(key, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::io(key, e))?;
        tracing::debug!("Wrote object {} to {}", key, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_counts_puts() {
        let store = MemoryObjectStore::new();
        assert!(!store.head_object("a").await.unwrap());
        store.put_object("a", b"1").await.unwrap();
        store.put_object("a", b"2").await.unwrap();
        assert!(store.head_object("a").await.unwrap());
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.get("a"), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_local_store_mirrors_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let key = "press/images/abc.png";
        assert!(!store.head_object(key).await.unwrap());
        store.put_object(key, b"png").await.unwrap();
        assert!(store.head_object(key).await.unwrap());
        assert_eq!(std::fs::read(dir.path().join(key)).unwrap(), b"png");
    }

    #[test]
    fn test_local_store_rejects_escaping_keys() {
        let store = LocalObjectStore::new("/tmp/store");
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("/abs").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("a/b.png").is_ok());
    }
}
