//! Codec traits and shared error type.
//!
//! Thumbnailing goes through two narrow traits so the rest of the crate never
//! touches a decoder directly:
//!
//! | Trait | Operation | Default |
//! |---|---|---|
//! | [`ImageResizer`] | bound a still image to `width × height` | [`RustResizer`] |
//! | [`FrameExtractor`] | grab one frame at half the duration | [`FfmpegExtractor`] |
//!
//! [`RustResizer`]: super::rust_backend::RustResizer
//! [`FfmpegExtractor`]: super::ffmpeg::FfmpegExtractor
//!
//! Both are called serially, one file at a time.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("{0} not found on PATH")]
    ToolMissing(&'static str),
}

/// Scales a still image down into a bounding box.
pub trait ImageResizer {
    /// Write a copy of `source` to `dest` that fits within `width × height`.
    /// Aspect ratio is preserved and images are never upscaled. The output
    /// format follows `dest`'s extension.
    fn resize(&self, source: &Path, dest: &Path, width: u32, height: u32)
    -> Result<(), BackendError>;
}

/// Extracts a representative still from a video.
pub trait FrameExtractor {
    /// Write one frame from the middle of `source` to
    /// `dest_dir/dest_filename`, `width_hint` pixels wide. Returns the path
    /// written.
    fn extract_frame(
        &self,
        source: &Path,
        dest_dir: &Path,
        dest_filename: &str,
        width_hint: u32,
    ) -> Result<PathBuf, BackendError>;
}
