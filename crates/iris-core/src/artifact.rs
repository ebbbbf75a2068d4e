//! Artifact preparation: turns an on-disk image reference into the
//! compact payload shipped to the reasoning service.

use crate::error::{EnrichError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, ImageReader};
use std::path::Path;
use tracing::debug;

/// Longest edge the remote service accepts efficiently.
const MAX_EDGE: u32 = 1024;
/// JPEG quality used for the re-encode.
const JPEG_QUALITY: u8 = 85;

/// A prepared image payload, owned by exactly one in-flight request.
#[derive(Debug, Clone)]
pub struct Artifact {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl Artifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The payload is always re-encoded to JPEG.
    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Loads and normalizes one image for upload.
///
/// The longest edge is capped at 1024 px (aspect ratio preserved,
/// Lanczos3), pixels are converted to RGB, and the result is re-encoded
/// as JPEG. Pure function of the file contents: identical input bytes
/// produce identical output bytes.
pub fn prepare(path: &Path) -> Result<Artifact> {
    if !path.exists() {
        return Err(EnrichError::preparation(format!(
            "image file not found: {}",
            path.display()
        )));
    }

    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let decoded = reader.decode().map_err(|err| {
        EnrichError::preparation(format!(
            "unsupported or corrupt image {}: {err}",
            path.display()
        ))
    })?;

    let resized = if decoded.width().max(decoded.height()) > MAX_EDGE {
        decoded.resize(MAX_EDGE, MAX_EDGE, FilterType::Lanczos3)
    } else {
        decoded
    };

    let rgb = resized.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|err| {
            EnrichError::preparation(format!("jpeg encode failed for {}: {err}", path.display()))
        })?;

    debug!(
        path = %path.display(),
        width,
        height,
        bytes = bytes.len(),
        "prepared artifact"
    );

    Ok(Artifact {
        bytes,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Write;

    fn write_test_png(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, 128]);
        }
        let path = dir.path().join(name);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn small_image_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_png(&dir, "small.png", 320, 240);
        let artifact = prepare(&path).unwrap();
        assert_eq!((artifact.width(), artifact.height()), (320, 240));
        assert!(artifact.byte_len() > 0);
        assert_eq!(artifact.mime_type(), "image/jpeg");
    }

    #[test]
    fn oversized_image_is_capped_at_longest_edge() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_png(&dir, "wide.png", 2048, 1024);
        let artifact = prepare(&path).unwrap();
        assert_eq!((artifact.width(), artifact.height()), (1024, 512));
    }

    #[test]
    fn output_is_byte_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_png(&dir, "repeat.png", 640, 480);
        let first = prepare(&path).unwrap();
        let second = prepare(&path).unwrap();
        assert_eq!(first.bytes(), second.bytes());
    }

    #[test]
    fn missing_file_is_a_preparation_error() {
        let err = prepare(Path::new("/nowhere/missing.jpg")).unwrap_err();
        assert_eq!(err.kind(), "preparation_error");
    }

    #[test]
    fn garbage_bytes_are_a_preparation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_image.jpg");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"definitely not an image").unwrap();
        let err = prepare(&path).unwrap_err();
        assert_eq!(err.kind(), "preparation_error");
    }
}
