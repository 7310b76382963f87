//! Image encoding: `DynamicImage` → PNG → `data:image/png;base64,…`.
//!
//! A data URL is string-safe: it goes into the JSON store as-is, and VLM
//! APIs accept its base64 payload directly. PNG keeps text edges crisp,
//! which matters more than size for transcription accuracy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

pub const PNG_MIME: &str = "image/png";
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// PNG-encode an image.
pub fn to_png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// PNG-encode an image and wrap it as a base64 data URL.
pub fn to_data_url(img: &DynamicImage) -> Result<String, image::ImageError> {
    let png = to_png_bytes(img)?;
    let url = format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(&png));
    debug!("Encoded {}x{} capture → {} bytes data URL", img.width(), img.height(), url.len());
    Ok(url)
}

/// Split a `data:<mime>;base64,<payload>` URL into `(mime, payload)`.
pub fn split_data_url(url: &str) -> Result<(&str, &str), DataUrlError> {
    let rest = url.strip_prefix("data:").ok_or(DataUrlError::NotADataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::NotADataUrl)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(DataUrlError::NotBase64)?;
    Ok((mime, payload))
}

/// Decode a data URL back to the raw image bytes.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, DataUrlError> {
    let (_, payload) = split_data_url(url)?;
    STANDARD
        .decode(payload)
        .map_err(|e| DataUrlError::InvalidBase64(e.to_string()))
}

/// Wrap a data URL for a multimodal VLM request.
///
/// `detail: "high"` keeps fine print legible for GPT-4-class tiling.
pub fn to_image_data(url: &str) -> Result<ImageData, DataUrlError> {
    let (mime, payload) = split_data_url(url)?;
    Ok(ImageData::new(payload.to_string(), mime.to_string()).with_detail("high"))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUrlError {
    #[error("not a data URL")]
    NotADataUrl,

    #[error("data URL is not base64-encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}
