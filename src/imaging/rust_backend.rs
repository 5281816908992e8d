//! Pure Rust image resizer.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF) | `image::ImageReader` with content sniffing |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality 85) |
//! | Encode → PNG / GIF | `image::DynamicImage::write_to` |
//!
//! The output format follows the destination extension, which the thumbnail
//! stage keeps equal to the source extension.

use super::backend::{BackendError, ImageResizer};
use super::calculations::fit_within;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const JPEG_QUALITY: u8 = 85;

/// Resizer backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustResizer;

impl RustResizer {
    pub fn new() -> Self {
        Self
    }
}

/// Load and decode an image, trusting its bytes over its extension.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

fn output_format(path: &Path) -> Result<ImageFormat, BackendError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        "gif" => Ok(ImageFormat::Gif),
        other => Err(BackendError::ProcessingFailed(format!(
            "Unsupported output format: {}",
            other
        ))),
    }
}

/// Save a DynamicImage to the given path, inferring format from extension.
fn save_image(img: &DynamicImage, path: &Path) -> Result<(), BackendError> {
    let format = output_format(path)?;
    let file = File::create(path).map_err(BackendError::Io)?;
    let mut writer = BufWriter::new(file);

    let result = match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        ImageFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut writer, format),
        _ => img.write_to(&mut writer, format),
    };
    result.map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to encode {}: {}", path.display(), e))
    })
}

impl ImageResizer for RustResizer {
    fn resize(
        &self,
        source: &Path,
        dest: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError> {
        let img = load_image(source)?;
        let (w, h) = fit_within((img.width(), img.height()), (width, height));
        let out = if (w, h) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(w, h, FilterType::Lanczos3)
        };
        save_image(&out, dest)
    }
}
