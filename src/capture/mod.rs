//! Capturer: full-viewport raster → cropped, encoded [`CapturedImage`].
//!
//! ```text
//! TabRasterizer::capture_visible(tab)   async, host-provided
//!        │ ViewportRaster { image, device_scale_factor }
//!        ▼
//! crop::crop_to_css(image, rect, s)     CPU-bound, spawn_blocking
//!        ▼
//! encode::to_data_url(image)            PNG → base64 data URL
//!        ▼
//! CapturedImage { data, timestamp }
//! ```
//!
//! [`capture_region`] has no side effects and never retries. Storing the
//! result is the coordinator's job.

pub mod crop;
pub mod encode;

use crate::coordinator::TabId;
use crate::error::CaptureError;
use crate::geometry::Rect;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use edgequake_llm::ImageData;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

pub use crop::CropError;
pub use encode::DataUrlError;

/// One cropped region, ready for storage and transcription.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedImage {
    data: String,
    timestamp: i64,
}

impl CapturedImage {
    /// Wrap a data URL, stamped with the current time.
    pub fn new(data: impl Into<String>) -> Self {
        Self::with_timestamp(data, Utc::now().timestamp_millis())
    }

    /// Wrap a data URL with an explicit epoch-millisecond timestamp.
    pub fn with_timestamp(data: impl Into<String>, timestamp: i64) -> Self {
        Self {
            data: data.into(),
            timestamp,
        }
    }

    /// The `data:image/png;base64,…` URL.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Capture time in epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// Decoded image file bytes.
    pub fn png_bytes(&self) -> Result<Vec<u8>, DataUrlError> {
        encode::decode_data_url(&self.data)
    }

    pub fn to_image_data(&self) -> Result<ImageData, DataUrlError> {
        encode::to_image_data(&self.data)
    }
}

/// A full-viewport bitmap at native device resolution.
#[derive(Debug, Clone)]
pub struct ViewportRaster {
    pub image: DynamicImage,
    /// Device pixels per CSS pixel.
    pub device_scale_factor: f64,
}

impl ViewportRaster {
    pub fn new(image: DynamicImage, device_scale_factor: f64) -> Self {
        Self {
            image,
            device_scale_factor,
        }
    }

    /// Load a viewport screenshot from disk.
    pub fn open(path: &Path, device_scale_factor: f64) -> Result<Self, image::ImageError> {
        let image = image::open(path)?;
        debug!(
            "Loaded {}x{} viewport from {} at scale {}",
            image.width(),
            image.height(),
            path.display(),
            device_scale_factor
        );
        Ok(Self::new(image, device_scale_factor))
    }
}

/// Host capability to rasterise the visible area of a tab.
#[async_trait]
pub trait TabRasterizer: Send + Sync {
    async fn capture_visible(&self, tab: TabId) -> Result<ViewportRaster, CaptureError>;
}

impl From<CropError> for CaptureError {
    fn from(e: CropError) -> Self {
        CaptureError::CropEncoding {
            detail: e.to_string(),
        }
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(e: image::ImageError) -> Self {
        CaptureError::CropEncoding {
            detail: format!("PNG encoding failed: {e}"),
        }
    }
}

/// Acquire, crop and encode one region of a tab.
pub async fn capture_region(
    rasterizer: &dyn TabRasterizer,
    tab: TabId,
    rect: Rect,
) -> Result<CapturedImage, CaptureError> {
    let start = Instant::now();
    let raster = rasterizer.capture_visible(tab).await?;

    let data = tokio::task::spawn_blocking(move || -> Result<String, CaptureError> {
        let cropped = crop::crop_to_css(&raster.image, rect, raster.device_scale_factor)?;
        Ok(encode::to_data_url(&cropped)?)
    })
    .await
    .map_err(|e| CaptureError::CropEncoding {
        detail: format!("crop task panicked: {e}"),
    })??;

    debug!(
        "Captured {}x{} region of tab {} in {:?}",
        rect.width,
        rect.height,
        tab,
        start.elapsed()
    );
    Ok(CapturedImage::new(data))
}
