//! Content-addressed upload pipeline
//!
//! blob → fingerprint → existence check → upload if absent → public URL.
//! Identical bytes always map to the same key, so a second upload of the
//! same image costs one `head_object` and no transfer.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::config::StorageConfig;

use super::fingerprint::Fingerprint;
use super::mime;
use super::store::{ObjectStore, StoreError};

/// Extension used when neither the name nor the MIME type gives one
const FALLBACK_EXTENSION: &str = "png";

/// Pipeline failures. Never retried.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Could not read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Upload of {key} failed: {source}")]
    Transport {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Where a blob's bytes come from
#[derive(Debug, Clone)]
pub enum BlobData {
    /// Already in memory (paste)
    Bytes(Vec<u8>),
    /// On disk (drop, pick)
    Path(PathBuf),
}

/// An opaque binary to upload
#[derive(Debug, Clone)]
pub struct AssetBlob {
    pub name: Option<String>,
    pub mime: Option<String>,
    pub data: BlobData,
}

impl AssetBlob {
    pub fn from_bytes(name: Option<String>, mime: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name,
            mime,
            data: BlobData::Bytes(bytes),
        }
    }

    /// Blob backed by a file; the MIME type is guessed from the extension
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let mime = name
            .as_deref()
            .and_then(mime::detect_image_mime)
            .map(str::to_string);
        Self {
            name,
            mime,
            data: BlobData::Path(path),
        }
    }

    /// Name used in messages
    pub fn display_name(&self) -> String {
        match (&self.name, &self.data) {
            (Some(name), _) => name.clone(),
            (None, BlobData::Path(path)) => path.display().to_string(),
            (None, BlobData::Bytes(_)) => "pasted image".to_string(),
        }
    }

    /// Object key extension: file name, then MIME subtype, then `png`
    pub fn extension(&self) -> String {
        self.name
            .as_deref()
            .and_then(mime::extension_of)
            .or_else(|| self.mime.as_deref().and_then(mime::extension_for_mime))
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
    }

    async fn into_bytes(self) -> Result<Vec<u8>, AssetError> {
        let name = self.display_name();
        let bytes = match self.data {
            BlobData::Bytes(bytes) => bytes,
            BlobData::Path(path) => tokio::fs::read(&path)
                .await
                .map_err(|source| AssetError::Read {
                    name: name.clone(),
                    source,
                })?,
        };
        if bytes.is_empty() {
            return Err(AssetError::Read {
                name,
                source: io::Error::new(io::ErrorKind::InvalidData, "blob is empty"),
            });
        }
        Ok(bytes)
    }
}

/// Whether the pipeline transferred bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadOutcome {
    Uploaded,
    AlreadyPresent,
}

/// Result of one successful ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRecord {
    pub fingerprint: Fingerprint,
    pub remote_key: String,
    pub url: String,
    pub outcome: UploadOutcome,
}

/// Upload pipeline bound to one store and key layout
#[derive(Clone)]
pub struct AssetPipeline {
    store: Arc<dyn ObjectStore>,
    key_prefix: String,
    public_base: String,
}

impl AssetPipeline {
    /// `key_prefix` gains a trailing `/` when missing; so does `public_base`
    pub fn new(store: Arc<dyn ObjectStore>, key_prefix: impl Into<String>, public_base: impl Into<String>) -> Self {
        let mut key_prefix = key_prefix.into();
        if !key_prefix.is_empty() && !key_prefix.ends_with('/') {
            key_prefix.push('/');
        }
        let mut public_base = public_base.into();
        if !public_base.ends_with('/') {
            public_base.push('/');
        }
        Self {
            store,
            key_prefix,
            public_base,
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &StorageConfig) -> Self {
        Self::new(store, config.key_prefix.clone(), config.public_base())
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// `prefix + "images/" + fingerprint + "." + extension`
    pub fn remote_key(&self, fingerprint: &Fingerprint, extension: &str) -> String {
        format!("{}images/{}.{}", self.key_prefix, fingerprint, extension)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.public_base, key)
    }

    /// Fingerprint a blob and upload it unless the store already has it
    pub async fn ingest(&self, blob: AssetBlob) -> Result<AssetRecord, AssetError> {
        let extension = blob.extension();
        let name = blob.display_name();
        let bytes = blob.into_bytes().await?;

        let fingerprint = Fingerprint::of(&bytes);
        let remote_key = self.remote_key(&fingerprint, &extension);
        let transport = |source: StoreError| AssetError::Transport {
            key: remote_key.clone(),
            source,
        };

        let outcome = if self.store.head_object(&remote_key).await.map_err(transport)? {
            tracing::debug!("Skipping upload of {}, {} already stored", name, remote_key);
            UploadOutcome::AlreadyPresent
        } else {
            self.store.put_object(&remote_key, &bytes).await.map_err(transport)?;
            tracing::info!("Uploaded {} ({} bytes) to {}", name, bytes.len(), remote_key);
            UploadOutcome::Uploaded
        };

        Ok(AssetRecord {
            fingerprint,
            url: self.public_url(&remote_key),
            remote_key,
            outcome,
        })
    }
}

impl std::fmt::Debug for AssetPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetPipeline")
            .field("key_prefix", &self.key_prefix)
            .field("public_base", &self.public_base)
            .finish()
    }
}

/// Pipeline writing into a local directory, with URLs pointing at the files
pub fn local_pipeline(root: &Path, key_prefix: &str) -> AssetPipeline {
    let store = Arc::new(super::store::LocalObjectStore::new(root));
    let base = format!("file://{}/", root.display().to_string().trim_end_matches('/'));
    AssetPipeline::new(store, key_prefix, base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::store::MemoryObjectStore;
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn head_object(&self, _key: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn put_object(&self, _key: &str, _bytes: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::request("503 Service Unavailable"))
        }
    }

    fn pipeline(store: Arc<MemoryObjectStore>) -> AssetPipeline {
        AssetPipeline::new(store, "press", "https://cdn.example.com")
    }

    #[tokio::test]
    async fn test_identical_bytes_upload_once() {
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = pipeline(store.clone());

        let blob = || AssetBlob::from_bytes(Some("cat.png".to_string()), Some("image/png".to_string()), vec![7; 64]);
        let first = pipeline.ingest(blob()).await.unwrap();
        let second = pipeline.ingest(blob()).await.unwrap();

        assert_eq!(first.outcome, UploadOutcome::Uploaded);
        assert_eq!(second.outcome, UploadOutcome::AlreadyPresent);
        assert_eq!(first.remote_key, second.remote_key);
        assert_eq!(first.url, second.url);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_key_layout() {
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = pipeline(store.clone());

        let bytes = b"not really a png".to_vec();
        let fingerprint = Fingerprint::of(&bytes);
        let record = pipeline
            .ingest(AssetBlob::from_bytes(Some("Shot 1.PNG".to_string()), None, bytes))
            .await
            .unwrap();

        assert_eq!(record.remote_key, format!("press/images/{}.png", fingerprint.to_hex()));
        assert_eq!(record.url, format!("https://cdn.example.com/{}", record.remote_key));
        assert_eq!(record.fingerprint, fingerprint);
        assert!(store.get(&record.remote_key).is_some());
    }

    #[test]
    fn test_extension_fallbacks() {
        let named = AssetBlob::from_bytes(Some("a.JPEG".to_string()), Some("image/png".to_string()), vec![1]);
        assert_eq!(named.extension(), "jpeg");

        let pasted = AssetBlob::from_bytes(None, Some("image/webp".to_string()), vec![1]);
        assert_eq!(pasted.extension(), "webp");

        let unknown = AssetBlob::from_bytes(None, None, vec![1]);
        assert_eq!(unknown.extension(), "png");
    }

    #[tokio::test]
    async fn test_unreadable_blob() {
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = pipeline(store.clone());

        let missing = AssetBlob::from_path("/definitely/not/here.png");
        assert!(matches!(pipeline.ingest(missing).await, Err(AssetError::Read { .. })));

        let empty = AssetBlob::from_bytes(None, Some("image/png".to_string()), Vec::new());
        assert!(matches!(pipeline.ingest(empty).await, Err(AssetError::Read { .. })));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_transport_error() {
        let pipeline = AssetPipeline::new(Arc::new(FailingStore), "press/", "https://cdn.example.com/");
        let blob = AssetBlob::from_bytes(None, Some("image/png".to_string()), vec![1, 2, 3]);
        let err = pipeline.ingest(blob).await.unwrap_err();
        match err {
            AssetError::Transport { key, .. } => assert!(key.starts_with("press/images/")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_local_pipeline_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("photo.jpg");
        std::fs::write(&image, b"jpeg bytes").unwrap();
        let store_dir = dir.path().join("store");

        let pipeline = local_pipeline(&store_dir, "press/");
        let record = pipeline.ingest(AssetBlob::from_path(&image)).await.unwrap();
        assert!(record.remote_key.ends_with(".jpg"));
        assert!(store_dir.join(&record.remote_key).exists());
        assert!(record.url.starts_with("file://"));
    }
}
