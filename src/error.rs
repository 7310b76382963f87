//! Error types for the tabscribe library.
//!
//! Errors come in two kinds, because failures happen in two places:
//!
//! * [`TabscribeError`] is **fatal** to the call that returned it: a bad
//!   config, an unconfigured provider, a transcription that failed for good.
//!   Library entry points return it.
//!
//! * [`CaptureError`], [`StoreError`] and [`SelectorError`] are **reported,
//!   not fatal**. The coordinator catches them at the boundary and turns
//!   them into status events. One bad capture never takes down the process
//!   or the page that asked for it.
//!
//! Every fatal variant can be built from the reported ones via `#[from]`, so a
//! caller that does want to abort can just use `?`.

use crate::coordinator::TabId;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tabscribe library.
#[derive(Debug, Error)]
pub enum TabscribeError {
    // ── Capture flow ──────────────────────────────────────────────────────
    /// A selection or capture is already running in this tab.
    #[error("A capture is already in progress in tab {tab}.\nFinish or cancel it (Escape) first.")]
    SelectionInProgress { tab: TabId },

    /// The host reports no active tab to capture from.
    #[error("No active tab to capture from")]
    NoActiveTab,

    /// The selector could not be injected into the page.
    #[error("Could not start selection in tab {tab}: {detail}")]
    InjectionFailed { tab: TabId, detail: String },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    // ── Transcription ────────────────────────────────────────────────────
    /// There is nothing to transcribe.
    #[error("No images to transcribe.\nCapture at least one region first.")]
    NoImages,

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every attempt failed.
    #[error("Transcription failed after {retries} retries: {detail}")]
    TranscriptionFailed { retries: u32, detail: String },

    /// A single attempt exceeded the per-call timeout and no retries remained.
    #[error("Transcription timed out after {secs}s\nIncrease --api-timeout.")]
    ApiTimeout { secs: u64 },

    /// A stored image is not a decodable data URL.
    #[error("Stored image {index} is not a valid image data URL: {detail}")]
    InvalidImageData { index: usize, detail: String },

    /// The model answered, but with nothing usable.
    #[error("No transcription returned by the model")]
    EmptyTranscription,

    // ── I/O ──────────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ───────────────────────────────────────────────────────────
    #[error("Failed to read settings '{path}': {source}")]
    SettingsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder or settings validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A reported failure of a single capture attempt.
///
/// Nothing is stored when one of these is produced.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum CaptureError {
    /// The host refused or failed to rasterise the viewport
    /// (permission revoked, tab closed, rate limited).
    #[error("Capture unavailable for tab {tab}: {detail}")]
    Unavailable { tab: TabId, detail: String },

    /// Cropping or PNG/base64 encoding failed.
    #[error("Could not crop or encode the capture: {detail}")]
    CropEncoding { detail: String },
}

/// A reported failure of the image store or its backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read image store '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persistence layer rejected the write (disk full, permissions).
    ///
    /// Displayed state may now differ from persisted state; the next read
    /// goes to the backend again.
    #[error("Failed to write image store '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image store '{path}' is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("Image index {index} is out of range (store holds {len} images)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Any other backend failure.
    #[error("Image store backend error: {0}")]
    Backend(String),
}

/// Failure to set up a selection session on a page.
///
/// When returned, the page has been restored to its pre-injection state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("A selection overlay is already active on this page")]
    AlreadyActive,

    #[error("Overlay injection failed: {0}")]
    InjectionFailed(String),
}
