//! Video frame extraction through the `ffprobe` and `ffmpeg` CLIs.
//!
//! Two calls per video:
//!
//! 1. `ffprobe -v error -show_entries format=duration -of json <src>`
//!    → container duration in seconds
//! 2. `ffmpeg -v error -y -ss <duration/2> -i <src> -frames:v 1 -vf scale=<W>:-2 <dest>`
//!    → one JPEG frame `W` pixels wide, height following the aspect ratio
//!
//! Both binaries are located on `PATH` with `which` when the extractor is
//! created. A missing binary is reported per video, not at startup, so a
//! gallery of stills builds fine on a machine without ffmpeg.

use super::backend::{BackendError, FrameExtractor};
use super::calculations::{even_width, midpoint_seconds};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    /// ffprobe prints numbers as strings.
    duration: Option<String>,
}

/// Parse the JSON printed by the duration probe.
fn parse_duration(json: &str) -> Result<f64, BackendError> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| BackendError::ProcessingFailed(format!("bad ffprobe output: {e}")))?;
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| BackendError::ProcessingFailed("ffprobe reported no duration".into()))
}

/// Run a tool, turning a non-zero exit into an error carrying stderr.
fn run(tool: &str, cmd: &mut Command) -> Result<Output, BackendError> {
    let output = cmd.stdin(Stdio::null()).output()?;
    if !output.status.success() {
        return Err(BackendError::ProcessingFailed(format!(
            "{tool} exited with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

/// Frame extractor backed by the ffmpeg CLIs.
#[derive(Debug, Clone, Default)]
pub struct FfmpegExtractor {
    ffprobe: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
}

impl FfmpegExtractor {
    pub fn new(ffprobe: Option<PathBuf>, ffmpeg: Option<PathBuf>) -> Self {
        Self { ffprobe, ffmpeg }
    }

    /// Find both tools on `PATH`.
    pub fn from_path() -> Self {
        Self {
            ffprobe: which::which("ffprobe").ok(),
            ffmpeg: which::which("ffmpeg").ok(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.ffprobe.is_some() && self.ffmpeg.is_some()
    }

    fn probe_duration(&self, source: &Path) -> Result<f64, BackendError> {
        let ffprobe = self
            .ffprobe
            .as_ref()
            .ok_or(BackendError::ToolMissing("ffprobe"))?;
        let output = run(
            "ffprobe",
            Command::new(ffprobe)
                .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
                .arg(source),
        )?;
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

impl FrameExtractor for FfmpegExtractor {
    fn extract_frame(
        &self,
        source: &Path,
        dest_dir: &Path,
        dest_filename: &str,
        width_hint: u32,
    ) -> Result<PathBuf, BackendError> {
        let ffmpeg = self
            .ffmpeg
            .as_ref()
            .ok_or(BackendError::ToolMissing("ffmpeg"))?;
        let at = midpoint_seconds(self.probe_duration(source)?);
        let dest = dest_dir.join(dest_filename);
        debug!(source = %source.display(), at, "extracting frame");

        run(
            "ffmpeg",
            Command::new(ffmpeg)
                .args(["-v", "error", "-y", "-ss"])
                .arg(format!("{at:.3}"))
                .arg("-i")
                .arg(source)
                .args(["-frames:v", "1", "-vf"])
                .arg(format!("scale={}:-2", even_width(width_hint)))
                .arg(&dest),
        )?;

        if !dest.exists() {
            return Err(BackendError::ProcessingFailed(format!(
                "ffmpeg produced no frame for {}",
                source.display()
            )));
        }
        Ok(dest)
    }
}
