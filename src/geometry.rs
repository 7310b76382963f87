//! Geometric types for selections and crop regions.
//!
//! Two coordinate spaces meet in this crate:
//!
//! * **Viewport CSS pixels**: what the page (and therefore the selector)
//!   sees. [`Point`] and [`Rect`] live here.
//! * **Device pixels**: what the rasterised viewport is made of. A display
//!   with a device scale factor of 2 has four device pixels per CSS pixel.
//!   [`DeviceRegion`] lives here.
//!
//! Converting between the two is the job of [`Rect::to_device`]; nothing
//! else in the crate multiplies by a scale factor.

use serde::{Deserialize, Serialize};

/// Minimum selection size (both width and height must exceed it) in CSS pixels.
pub const MIN_SELECTION_PX: f64 = 10.0;

/// Pointer position in viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Pinned to the viewport's top-left edge. A held pointer keeps
    /// reporting positions after it leaves the window.
    pub fn clamped(self) -> Self {
        Self::new(self.x.max(0.0), self.y.max(0.0))
    }
}

/// Axis-aligned rectangle in viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Bounding box of two points, independent of drag direction.
    pub fn spanning(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    /// Zero-size rectangle positioned at `p`.
    pub fn at(p: Point) -> Self {
        Self::new(p.x, p.y, 0.0, 0.0)
    }

    /// True when both dimensions strictly exceed `threshold`.
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.width > threshold && self.height > threshold
    }

    /// Scale every field by `scale` and round to whole device pixels.
    ///
    /// Origins are clamped at zero. Use [`device_origin`](Self::device_origin)
    /// where a negative origin must be kept.
    pub fn to_device(&self, scale: f64) -> DeviceRegion {
        DeviceRegion {
            x: (self.x * scale).round().max(0.0) as u32,
            y: (self.y * scale).round().max(0.0) as u32,
            width: (self.width * scale).round().max(0.0) as u32,
            height: (self.height * scale).round().max(0.0) as u32,
        }
    }

    /// Signed top-left corner in device pixels.
    pub fn device_origin(&self, scale: f64) -> (i64, i64) {
        ((self.x * scale).round() as i64, (self.y * scale).round() as i64)
    }

    /// Output raster size in CSS pixels, rounded to whole pixels.
    pub fn css_size(&self) -> (u32, u32) {
        (
            self.width.round().max(0.0) as u32,
            self.height.round().max(0.0) as u32,
        )
    }
}

/// Crop source region in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DeviceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}
