//! Observable, persisted, ordered image collection.
//!
//! Insertion order is display order is transcription order. Every mutation
//! reads the collection from the backend, changes it, writes it back, and
//! only then notifies subscribers with the new full collection. A failed
//! write notifies no one, and because nothing is cached the next read goes
//! back to the backend.
//!
//! In-process mutations are serialized by one async lock. Writers in other
//! processes remain last-write-wins.

pub mod backend;

pub use backend::{JsonFileBackend, MemoryBackend, StorageBackend, IMAGES_FILE};

use crate::capture::CapturedImage;
use crate::error::StoreError;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

/// The collection as delivered to subscribers.
pub type Snapshot = Arc<Vec<CapturedImage>>;

pub struct ImageStore {
    backend: Arc<dyn StorageBackend>,
    /// Held for the whole read-modify-write; also guards the subscriber list.
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Snapshot>>>,
}

impl ImageStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Current collection, read from the backend.
    pub async fn images(&self) -> Result<Vec<CapturedImage>, StoreError> {
        self.backend.load().await
    }

    /// Append one image. Returns the new collection length.
    pub async fn append(&self, image: CapturedImage) -> Result<usize, StoreError> {
        let len = self
            .mutate(|images| {
                images.push(image);
                Ok(())
            })
            .await?;
        info!("Appended image ({} in store)", len);
        Ok(len)
    }

    /// Remove the image at `index`, shifting later images down.
    pub async fn remove_at(&self, index: usize) -> Result<CapturedImage, StoreError> {
        let mut removed = None;
        self.mutate(|images| {
            if index >= images.len() {
                return Err(StoreError::IndexOutOfRange {
                    index,
                    len: images.len(),
                });
            }
            removed = Some(images.remove(index));
            Ok(())
        })
        .await?;
        removed.ok_or_else(|| StoreError::Backend("removal produced no image".into()))
    }

    /// Replace the whole collection.
    pub async fn replace_all(&self, new_images: Vec<CapturedImage>) -> Result<(), StoreError> {
        self.mutate(|images| {
            *images = new_images;
            Ok(())
        })
        .await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.replace_all(Vec::new()).await
    }

    /// Observe every future change.
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(tx);
        Subscription { rx }
    }

    async fn mutate<F>(&self, f: F) -> Result<usize, StoreError>
    where
        F: FnOnce(&mut Vec<CapturedImage>) -> Result<(), StoreError>,
    {
        let mut subscribers = self.subscribers.lock().await;
        let mut images = self.backend.load().await?;
        f(&mut images)?;
        self.backend.save(&images).await?;

        let len = images.len();
        let snapshot: Snapshot = Arc::new(images);
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
        if subscribers.len() < before {
            debug!("Pruned {} closed subscribers", before - subscribers.len());
        }
        Ok(len)
    }
}

/// Receives the full collection after every successful change.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl Subscription {
    /// Wait for the next change. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// The next already-delivered change, if any.
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<Snapshot> {
        UnboundedReceiverStream::new(self.rx)
    }
}
