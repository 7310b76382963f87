//! Pure region cropping: CSS rectangle + scale factor → cropped raster.
//!
//! No I/O. The scale factor is an argument, never looked up. The same call
//! always yields the same pixels, so every numeric contract here can be
//! unit-tested.
//!
//! The contract has two halves:
//!
//! 1. The **source** region is `rect * scale` in all four fields. The raster
//!    is in device pixels; the rectangle is in CSS pixels.
//! 2. The **destination** is exactly `rect.width × rect.height`, unscaled.
//!    Output is always in CSS pixel units whatever the display density.

use crate::geometry::{DeviceRegion, Rect};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};

/// Source crop region, in device pixels, for a CSS rectangle.
pub fn device_region(rect: Rect, scale: f64) -> DeviceRegion {
    rect.to_device(scale)
}

/// Largest source region accepted, as a multiple of the raster size in
/// each dimension.
pub const MAX_OVERSHOOT: u32 = 2;

/// Crop `image` (device pixels) to `rect` (CSS pixels) at `scale`.
///
/// Source pixels past any raster edge come out transparent, which matches
/// drawing an out-of-range source rectangle onto a canvas. A negative
/// origin shifts the visible part right/down instead of being clamped.
pub fn crop_to_css(image: &DynamicImage, rect: Rect, scale: f64) -> Result<DynamicImage, CropError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(CropError::InvalidScale(scale));
    }

    let (out_w, out_h) = rect.css_size();
    if out_w == 0 || out_h == 0 {
        return Err(CropError::ZeroDimension);
    }

    let src = device_region(rect, scale);
    let (img_w, img_h) = image.dimensions();
    let out_of_bounds = || CropError::OutOfBounds {
        requested: src,
        image_size: (img_w, img_h),
    };
    if src.width > img_w.saturating_mul(MAX_OVERSHOOT)
        || src.height > img_h.saturating_mul(MAX_OVERSHOOT)
    {
        return Err(out_of_bounds());
    }

    // Visible part of the source, in signed raster coordinates.
    let (ox, oy) = rect.device_origin(scale);
    let left = ox.max(0);
    let top = oy.max(0);
    let right = (ox + i64::from(src.width)).min(i64::from(img_w));
    let bottom = (oy + i64::from(src.height)).min(i64::from(img_h));
    if src.width == 0 || src.height == 0 || right <= left || bottom <= top {
        return Err(out_of_bounds());
    }

    let (visible_w, visible_h) = ((right - left) as u32, (bottom - top) as u32);
    let visible = image
        .crop_imm(left as u32, top as u32, visible_w, visible_h)
        .to_rgba8();

    let source = if (visible_w, visible_h) == (src.width, src.height) {
        visible
    } else {
        let mut canvas = RgbaImage::new(src.width, src.height);
        imageops::overlay(&mut canvas, &visible, left - ox, top - oy);
        canvas
    };

    let out = if source.dimensions() == (out_w, out_h) {
        source
    } else {
        imageops::resize(&source, out_w, out_h, FilterType::Triangle)
    };

    Ok(DynamicImage::ImageRgba8(out))
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Crop rectangle has zero width or height")]
    ZeroDimension,

    #[error("Device scale factor must be a positive number, got {0}")]
    InvalidScale(f64),

    #[error(
        "Crop region ({},{},{},{}) lies outside the captured viewport ({}x{})",
        requested.x, requested.y, requested.width, requested.height,
        image_size.0, image_size.1
    )]
    OutOfBounds {
        requested: DeviceRegion,
        image_size: (u32, u32),
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    /// Viewport of `css_w × css_h` CSS px at `scale`, black with a red block
    /// covering CSS rect (10,10,200,100).
    fn viewport(css_w: u32, css_h: u32, scale: f64) -> DynamicImage {
        let w = (css_w as f64 * scale).round() as u32;
        let h = (css_h as f64 * scale).round() as u32;
        let red = Rect::new(10.0, 10.0, 200.0, 100.0).to_device(scale);
        let img = RgbaImage::from_fn(w, h, |x, y| {
            let inside = x >= red.x && x < red.x + red.width && y >= red.y && y < red.y + red.height;
            if inside {
                RED
            } else {
                BLACK
            }
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn source_region_scales_with_device_factor() {
        let r = Rect::new(10.0, 10.0, 200.0, 100.0);
        assert_eq!(device_region(r, 1.0), DeviceRegion::new(10, 10, 200, 100));
        assert_eq!(device_region(r, 1.5), DeviceRegion::new(15, 15, 300, 150));
        assert_eq!(device_region(r, 2.0), DeviceRegion::new(20, 20, 400, 200));
        assert_eq!(device_region(r, 3.0), DeviceRegion::new(30, 30, 600, 300));
    }

    #[test]
    fn output_is_css_sized_at_every_scale() {
        let r = Rect::new(10.0, 10.0, 200.0, 100.0);
        for s in [1.0, 1.5, 2.0, 3.0] {
            let out = crop_to_css(&viewport(400, 300, s), r, s).expect("crop");
            assert_eq!(out.dimensions(), (200, 100), "scale {s}");
        }
    }

    #[test]
    fn crop_is_aligned_with_scaled_source() {
        let r = Rect::new(10.0, 10.0, 200.0, 100.0);
        for s in [1.0, 1.5, 2.0, 3.0] {
            let out = crop_to_css(&viewport(400, 300, s), r, s).unwrap().to_rgba8();
            for (x, y) in [(0, 0), (199, 0), (0, 99), (199, 99), (100, 50)] {
                assert_eq!(*out.get_pixel(x, y), RED, "scale {s} pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn unscaled_crop_misses_target_on_hidpi() {
        // Using the CSS rect directly on a 2x raster lands on the wrong pixels.
        let img = viewport(400, 300, 2.0);
        let wrong = crop_to_css(&img, Rect::new(0.0, 0.0, 10.0, 10.0), 1.0).unwrap().to_rgba8();
        assert_eq!(*wrong.get_pixel(5, 5), BLACK);
    }

    #[test]
    fn zero_dimension_fails() {
        let img = viewport(100, 100, 1.0);
        let r = crop_to_css(&img, Rect::new(0.0, 0.0, 0.0, 50.0), 1.0);
        assert!(matches!(r, Err(CropError::ZeroDimension)));
    }

    #[test]
    fn invalid_scale_fails() {
        let img = viewport(100, 100, 1.0);
        for s in [0.0, -1.0, f64::NAN] {
            let r = crop_to_css(&img, Rect::new(0.0, 0.0, 20.0, 20.0), s);
            assert!(matches!(r, Err(CropError::InvalidScale(_))), "scale {s}");
        }
    }

    #[test]
    fn fully_outside_fails() {
        let img = viewport(100, 100, 1.0);
        let r = crop_to_css(&img, Rect::new(150.0, 150.0, 20.0, 20.0), 1.0);
        assert!(matches!(r, Err(CropError::OutOfBounds { .. })));
    }

    #[test]
    fn negative_origin_shifts_visible_part() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(100, 100, |x, _| {
            if x < 50 {
                RED
            } else {
                Rgba([0, 0, 255, 255])
            }
        }));
        let out = crop_to_css(&img, Rect::new(-50.0, 0.0, 100.0, 20.0), 1.0)
            .unwrap()
            .to_rgba8();
        assert_eq!(out.dimensions(), (100, 20));
        assert_eq!(out.get_pixel(0, 0).0[3], 0, "left of the raster is transparent");
        assert_eq!(out.get_pixel(49, 10).0[3], 0);
        assert_eq!(*out.get_pixel(60, 0), RED);
    }

    #[test]
    fn negative_origin_at_hidpi() {
        let img = viewport(100, 100, 2.0);
        // CSS (-5,-5) 20x20 covers CSS (0..15) of the viewport.
        let out = crop_to_css(&img, Rect::new(-5.0, -5.0, 20.0, 20.0), 2.0)
            .unwrap()
            .to_rgba8();
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get_pixel(1, 1).0[3], 0);
        assert_eq!(*out.get_pixel(10, 10), BLACK);
        assert_eq!(*out.get_pixel(18, 18), RED);
    }

    #[test]
    fn oversized_region_is_refused() {
        let img = viewport(100, 100, 1.0);
        let r = crop_to_css(&img, Rect::new(0.0, 0.0, 100_000.0, 100_000.0), 1.0);
        assert!(matches!(r, Err(CropError::OutOfBounds { .. })));
        assert!(crop_to_css(&img, Rect::new(0.0, 0.0, 200.0, 200.0), 1.0).is_ok());
    }

    #[test]
    fn fully_left_of_raster_fails() {
        let img = viewport(100, 100, 1.0);
        let r = crop_to_css(&img, Rect::new(-40.0, 0.0, 20.0, 20.0), 1.0);
        assert!(matches!(r, Err(CropError::OutOfBounds { .. })));
    }

    #[test]
    fn partial_overlap_pads_with_transparency() {
        let img = viewport(100, 100, 1.0);
        let out = crop_to_css(&img, Rect::new(90.0, 90.0, 20.0, 20.0), 1.0)
            .unwrap()
            .to_rgba8();
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(*out.get_pixel(5, 5), BLACK);
        assert_eq!(out.get_pixel(15, 15).0[3], 0, "outside raster must be transparent");
    }
}
