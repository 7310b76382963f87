//! # tabscribe
//!
//! Select a region of a browser tab, crop it at the right display scale,
//! collect the crops in a durable observable store, and transcribe them to
//! HTML with a Vision Language Model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! start_capture()
//!  │
//!  ├─ 1. Select   overlay + pointer drag in the page (selector)
//!  ├─ 2. Message  AreaSelected{request, rect} → coordinator (mpsc, one-way)
//!  ├─ 3. Capture  viewport raster → crop at device scale → PNG data URL
//!  ├─ 4. Store    append to images.json, notify subscribers
//!  └─ 5. Scribe   all images, in order → VLM → cleaned HTML
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabscribe::{
//!     browser::VirtualBrowser, capture::ViewportRaster, CaptureCoordinator, ImageStore,
//!     JsonFileBackend, ScribeConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScribeConfig::default();
//!     let store = Arc::new(ImageStore::new(Arc::new(config.image_backend())));
//!
//!     let browser = Arc::new(VirtualBrowser::new());
//!     browser.open_tab(ViewportRaster::open("viewport.png".as_ref(), 2.0)?);
//!
//!     let (coordinator, rx) =
//!         CaptureCoordinator::new(browser.clone(), browser.clone(), store.clone(), &config);
//!     coordinator.start_capture().await?;
//!     // ... deliver pointer events with browser.dispatch(...)
//!     drop(rx);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tabscribe` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod browser;
pub mod capture;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod geometry;
pub mod progress;
pub mod selector;
pub mod settings;
pub mod store;
pub mod transcribe;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use capture::{capture_region, CapturedImage, TabRasterizer, ViewportRaster};
pub use config::{ScribeConfig, ScribeConfigBuilder};
pub use coordinator::{CaptureCoordinator, CaptureTicket, Envelope, Handled, Outbox, RequestId, TabHost, TabId};
pub use error::{CaptureError, SelectorError, StoreError, TabscribeError};
pub use export::{export_images, write_markup};
pub use geometry::{Point, Rect, MIN_SELECTION_PX};
pub use progress::{CaptureProgressCallback, NoopCaptureCallback};
pub use selector::{AbortReason, SelectionOutcome, SelectionSession, SelectorMessage};
pub use settings::Settings;
pub use store::{ImageStore, JsonFileBackend, MemoryBackend, StorageBackend, Subscription};
pub use transcribe::{transcribe, Transcription, DEFAULT_PROMPT};
