//! Persistence backends for the image collection.
//!
//! A backend reads and writes the *whole* collection. There is no partial
//! update: every store operation is read-modify-write, which keeps the
//! on-disk file the single source of truth.

use crate::capture::CapturedImage;
use crate::error::StoreError;
use crate::export::persist_atomic;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// File name of the persisted collection inside the data directory.
pub const IMAGES_FILE: &str = "images.json";

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn load(&self) -> Result<Vec<CapturedImage>, StoreError>;
    async fn save(&self, images: &[CapturedImage]) -> Result<(), StoreError>;
}

/// On-disk layout: `{"images": [...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ImagesDocument {
    #[serde(default)]
    images: Vec<CapturedImage>,
}

/// Durable backend: a JSON file replaced atomically on each save.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/images.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(IMAGES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    async fn load(&self) -> Result<Vec<CapturedImage>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let doc: ImagesDocument = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;
        Ok(doc.images)
    }

    async fn save(&self, images: &[CapturedImage]) -> Result<(), StoreError> {
        let doc = ImagesDocument {
            images: images.to_vec(),
        };
        let json = serde_json::to_vec(&doc).map_err(|e| StoreError::Backend(e.to_string()))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| StoreError::Backend(format!("write task panicked: {e}")))??;

        debug!("Persisted {} images to {}", images.len(), self.path.display());
        Ok(())
    }
}

/// Readers see either the old or the new collection, never a torn file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    persist_atomic(path, bytes).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Volatile backend for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    images: RwLock<Vec<CapturedImage>>,
}

impl MemoryBackend {
    pub fn with_images(images: Vec<CapturedImage>) -> Self {
        Self {
            images: RwLock::new(images),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self) -> Result<Vec<CapturedImage>, StoreError> {
        Ok(self.images.read().await.clone())
    }

    async fn save(&self, images: &[CapturedImage]) -> Result<(), StoreError> {
        *self.images.write().await = images.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(n: i64) -> CapturedImage {
        CapturedImage::with_timestamp(format!("data:image/png;base64,{n}"), n)
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let b = JsonFileBackend::in_dir(dir.path());
        assert!(b.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let b = JsonFileBackend::in_dir(&dir.path().join("nested"));
        b.save(&[img(1), img(2), img(3)]).await.unwrap();
        let loaded = b.load().await.unwrap();
        assert_eq!(loaded, vec![img(1), img(2), img(3)]);
    }

    #[tokio::test]
    async fn file_layout_is_images_array() {
        let dir = tempfile::tempdir().unwrap();
        let b = JsonFileBackend::in_dir(dir.path());
        b.save(&[img(5)]).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(b.path()).unwrap()).unwrap();
        assert_eq!(raw["images"][0]["timestamp"], 5);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let b = JsonFileBackend::in_dir(dir.path());
        std::fs::write(b.path(), b"{not json").unwrap();
        assert!(matches!(b.load().await, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn unwritable_target_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let target = dir.path().join(IMAGES_FILE);
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupant"), b"x").unwrap();
        let b = JsonFileBackend::new(target);
        assert!(matches!(b.save(&[img(1)]).await, Err(StoreError::Write { .. })));
    }
}
