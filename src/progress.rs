//! Status-callback trait for capture events.
//!
//! Inject an [`Arc<dyn CaptureProgressCallback>`] via
//! [`crate::config::ScribeConfigBuilder::capture_callback`] to hear about
//! every step of every capture: selection started, area selected, image
//! stored, selection aborted, capture failed.
//!
//! Every failure in the coordinator ends up here rather than propagating.
//! This is the boundary at which errors become user-visible status text.
//!
//! # Example
//!
//! ```rust
//! use tabscribe::{CaptureProgressCallback, ScribeConfig, TabId};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     stored: AtomicUsize,
//! }
//!
//! impl CaptureProgressCallback for CountingCallback {
//!     fn on_image_stored(&self, _tab: TabId, collection_len: usize) {
//!         self.stored.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{collection_len} images in store");
//!     }
//! }
//!
//! let config = ScribeConfig::builder()
//!     .capture_callback(Arc::new(CountingCallback { stored: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::coordinator::TabId;
use crate::geometry::Rect;
use crate::selector::AbortReason;
use std::sync::Arc;

/// Called by the coordinator as captures progress.
///
/// Implementations must be `Send + Sync`: the coordinator may run on any
/// tokio worker. All methods default to no-ops.
pub trait CaptureProgressCallback: Send + Sync {
    /// The selector was injected; the user can now drag.
    fn on_selection_started(&self, tab: TabId) {
        let _ = tab;
    }

    /// The user finished a drag above the size threshold.
    fn on_area_selected(&self, tab: TabId, rect: Rect) {
        let _ = (tab, rect);
    }

    /// The cropped image was appended.
    ///
    /// # Arguments
    /// * `collection_len`: number of images in the store after the append
    fn on_image_stored(&self, tab: TabId, collection_len: usize) {
        let _ = (tab, collection_len);
    }

    /// The gesture ended without a rectangle (Escape or too small).
    fn on_selection_aborted(&self, tab: TabId, reason: AbortReason) {
        let _ = (tab, reason);
    }

    /// Capture, crop, encode or store failed. Nothing was stored.
    ///
    /// # Arguments
    /// * `error`: human-readable description
    fn on_capture_failed(&self, tab: TabId, error: &str) {
        let _ = (tab, error);
    }
}

/// A no-op implementation for callers that don't need status events.
pub struct NoopCaptureCallback;

impl CaptureProgressCallback for NoopCaptureCallback {}

/// Convenience alias matching the type stored in [`crate::config::ScribeConfig`].
pub type CaptureCallback = Arc<dyn CaptureProgressCallback>;
