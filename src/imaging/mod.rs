//! Thumbnail codecs.
//!
//! | Operation | Crate / tool |
//! |---|---|
//! | **Still images** | `image` crate: decode, Lanczos3 resize, re-encode |
//! | **Video frames** | `ffprobe` for duration, `ffmpeg` for a single frame |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Backend**: [`ImageResizer`] / [`FrameExtractor`] traits + error type
//! - **Rust backend**: [`RustResizer`]
//! - **FFmpeg**: [`FfmpegExtractor`]

pub mod backend;
mod calculations;
pub mod ffmpeg;
pub mod rust_backend;

pub use backend::{BackendError, FrameExtractor, ImageResizer};
pub use calculations::fit_within;
pub use ffmpeg::FfmpegExtractor;
pub use rust_backend::RustResizer;
