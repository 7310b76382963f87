//! Writing captures and transcriptions to disk.

use crate::capture::CapturedImage;
use crate::error::TabscribeError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write every image as `screenshot-1.png`, `screenshot-2.png`, … in
/// collection order. Returns the written paths.
pub fn export_images(images: &[CapturedImage], dir: &Path) -> Result<Vec<PathBuf>, TabscribeError> {
    if images.is_empty() {
        return Err(TabscribeError::NoImages);
    }

    let mut paths = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let bytes = image
            .png_bytes()
            .map_err(|e| TabscribeError::InvalidImageData {
                index,
                detail: e.to_string(),
            })?;
        let path = dir.join(format!("screenshot-{}.png", index + 1));
        write_file_atomic(&path, &bytes)?;
        paths.push(path);
    }

    info!("Exported {} images to {}", paths.len(), dir.display());
    Ok(paths)
}

/// Write transcription markup to `path` atomically.
pub fn write_markup(path: &Path, markup: &str) -> Result<(), TabscribeError> {
    write_file_atomic(path, markup.as_bytes())?;
    info!("Wrote {} bytes of markup to {}", markup.len(), path.display());
    Ok(())
}

/// Write to a temp file next to `path`, then rename over it.
///
/// Creates parent directories. A crash mid-write leaves the old file intact.
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<(), TabscribeError> {
    persist_atomic(path, bytes).map_err(|source| TabscribeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Temp file in the target's directory, flushed to disk, then renamed.
pub(crate) fn persist_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::encode::to_data_url;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png(w: u32) -> CapturedImage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, 4, Rgba([1, 2, 3, 255])));
        CapturedImage::with_timestamp(to_data_url(&img).unwrap(), 0)
    }

    #[test]
    fn images_are_numbered_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = export_images(&[png(3), png(5)], dir.path()).unwrap();
        assert_eq!(paths[0].file_name().unwrap(), "screenshot-1.png");
        assert_eq!(paths[1].file_name().unwrap(), "screenshot-2.png");
        let second = image::open(&paths[1]).unwrap();
        assert_eq!(second.width(), 5);
    }

    #[test]
    fn nothing_to_export() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(export_images(&[], dir.path()), Err(TabscribeError::NoImages)));
    }

    #[test]
    fn markup_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/notes.html");
        write_markup(&path, "<p>one</p>").unwrap();
        write_markup(&path, "<p>two</p>").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<p>two</p>");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1, "no temp files left behind");
    }

    #[test]
    fn write_failure_names_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let target = blocker.join("notes.html");
        match write_markup(&target, "<p/>") {
            Err(TabscribeError::OutputWriteFailed { path, .. }) => assert_eq!(path, target),
            other => panic!("expected OutputWriteFailed, got {other:?}"),
        }
    }
}
