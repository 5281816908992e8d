//! Build configuration.
//!
//! Handles loading, validating, and layering `gallery.toml`. Three layers
//! are merged, later ones winning key by key:
//!
//! 1. Stock defaults ([`BuildConfig::default`])
//! 2. `gallery.toml` in the source directory, or the file given with `--config`
//! 3. Command-line flags ([`Overrides`])
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output = "html"              # Output directory
//! title = "Home"               # Title of the root page
//!
//! width = 300                  # Thumbnail bounding box
//! height = 300
//! preview_size = 10            # Thumbnails sampled per directory card (1-10)
//! preview_seed = 0             # Seed for the preview sample
//!
//! thumbs_dir_name = "_thumbs"  # Thumbnail directory inside the output
//! full_dir_name = "_full"      # Copied originals inside the output
//! cache_file = ".cache"        # Cache file inside the output
//! index_filename = "index.html"
//!
//! copy_files = false           # Mirror originals into full_dir_name
//! # transform = "./convert.sh" # Program used instead of a plain copy
//! # script = "dist/main.js"    # Pre-bundled script, copied to bundle.js
//! # template = "my-theme"      # Directory holding a Handlebars index.html
//! ```
//!
//! Relative paths in the file are resolved against the working directory.
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the source directory.
pub const CONFIG_FILENAME: &str = "gallery.toml";

/// Upper bound for `preview_size`.
pub const MAX_PREVIEW_SIZE: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Build configuration loaded from `gallery.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub output: PathBuf,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub preview_size: usize,
    pub preview_seed: u64,
    pub thumbs_dir_name: String,
    pub full_dir_name: String,
    pub cache_file: String,
    pub index_filename: String,
    pub copy_files: bool,
    pub transform: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub template: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("html"),
            title: "Home".to_string(),
            width: 300,
            height: 300,
            preview_size: MAX_PREVIEW_SIZE,
            preview_seed: 0,
            thumbs_dir_name: "_thumbs".to_string(),
            full_dir_name: "_full".to_string(),
            cache_file: ".cache".to_string(),
            index_filename: "index.html".to_string(),
            copy_files: false,
            transform: None,
            script: None,
            template: None,
        }
    }
}

fn validate_name(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(ConfigError::Validation(format!(
            "{key} must be a plain file name, got {value:?}"
        )));
    }
    if value.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "{key} must not contain path separators, got {value:?}"
        )));
    }
    Ok(())
}

impl BuildConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Validation(
                "width and height must be non-zero".into(),
            ));
        }
        if self.preview_size == 0 || self.preview_size > MAX_PREVIEW_SIZE {
            return Err(ConfigError::Validation(format!(
                "preview_size must be 1-{MAX_PREVIEW_SIZE}"
            )));
        }
        validate_name("thumbs_dir_name", &self.thumbs_dir_name)?;
        validate_name("full_dir_name", &self.full_dir_name)?;
        validate_name("cache_file", &self.cache_file)?;
        validate_name("index_filename", &self.index_filename)?;
        if self.thumbs_dir_name == self.full_dir_name {
            return Err(ConfigError::Validation(
                "thumbs_dir_name and full_dir_name must differ".into(),
            ));
        }
        if self.transform.is_some() && !self.copy_files {
            return Err(ConfigError::Validation(
                "transform requires copy_files = true".into(),
            ));
        }
        Ok(())
    }
}

/// Values given on the command line. `None` leaves the config untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub output: Option<PathBuf>,
    pub copy_files: Option<bool>,
    pub transform: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub script: Option<PathBuf>,
    pub template: Option<PathBuf>,
}

impl Overrides {
    /// Apply on top of `config` and re-validate.
    pub fn apply(self, mut config: BuildConfig) -> Result<BuildConfig, ConfigError> {
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(copy) = self.copy_files {
            config.copy_files = copy;
        }
        if let Some(transform) = self.transform {
            config.transform = Some(transform);
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(script) = self.script {
            config.script = Some(script);
        }
        if let Some(template) = self.template {
            config.template = Some(template);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Output locations derived from the output root and the config names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    pub output: PathBuf,
    pub thumbs_dir: PathBuf,
    pub full_dir: PathBuf,
    pub cache_path: PathBuf,
    pub index_path: PathBuf,
}

impl BuildPaths {
    pub fn new(output: &Path, config: &BuildConfig) -> Self {
        Self {
            output: output.to_path_buf(),
            thumbs_dir: output.join(&config.thumbs_dir_name),
            full_dir: output.join(&config.full_dir_name),
            cache_path: output.join(&config.cache_file),
            index_path: output.join(&config.index_filename),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BuildConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the build config.
///
/// An explicit path must exist. Without one, `gallery.toml` in `source` is
/// used when present and stock defaults otherwise.
pub fn load_config(source: &Path, explicit: Option<&Path>) -> Result<BuildConfig, ConfigError> {
    let overlay = match explicit {
        Some(path) => Some(load_raw_config(path)?),
        None => {
            let default_path = source.join(CONFIG_FILENAME);
            if default_path.exists() {
                Some(load_raw_config(&default_path)?)
            } else {
                None
            }
        }
    };
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock `gallery.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# thumbgal configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file at <source>/gallery.toml or pass it with --config.
# Command-line flags override values set here.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
# Directory the gallery is written to. Skipped by discovery when it lives
# inside the source tree.
output = "html"

# Title of the root page. Sub-pages are titled after their directory.
title = "Home"

# Name of the root page inside the output directory.
index_filename = "index.html"

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
# Bounding box in pixels. Aspect ratio is preserved and small images are
# never upscaled. Video frames are extracted at `width`.
width = 300
height = 300

# Directory (inside the output) that holds generated thumbnails.
thumbs_dir_name = "_thumbs"

# How many thumbnails a directory card previews (1-10), and the seed used
# to pick them. Keep the seed fixed for reproducible pages.
preview_size = 10
preview_seed = 0

# ---------------------------------------------------------------------------
# Copying originals
# ---------------------------------------------------------------------------
# Mirror every source file into the output so the gallery is self-contained.
copy_files = false

# Directory (inside the output) that holds the copies.
full_dir_name = "_full"

# Program run instead of a plain copy, as `<program> read|write <src> <dest>`.
# `read` exits 0 when <dest> is up to date. Requires copy_files = true.
# transform = "./convert.sh"

# ---------------------------------------------------------------------------
# Assets and cache
# ---------------------------------------------------------------------------
# Pre-bundled client script, copied to <output>/bundle.js and referenced
# from every page.
# script = "dist/main.js"

# Directory holding an `index.html` Handlebars template used instead of the
# built-in page layout. It must exist when the build starts.
# template = "my-theme"

# Cache file (inside the output) that makes rebuilds incremental.
cache_file = ".cache"
"##
}
