//! Persistent fact cache for incremental builds.
//!
//! Generating a thumbnail means decoding a full-size image or seeking into a
//! video with ffmpeg, which dominates the cost of a build. This module lets
//! the stages skip that work when nothing about the source has changed since
//! the last successful run.
//!
//! # Design
//!
//! The cache stores **facts** about entries: a named observation with the
//! time it was made and an arbitrary JSON value.
//!
//! ```text
//! identifier → fact name → { observedAt, value }
//! ```
//!
//! Stages define their own fact names ([`FACT_THUMBNAIL`], [`FACT_COPIED`]).
//! A fact is **valid** for an entry when it exists, its value equals the
//! expected value, and it was observed no earlier than the entry's current
//! mtime (`observedAt >= modified_at`). Touching a source file therefore
//! invalidates every fact about it.
//!
//! Identifiers are path hashes ([`crate::entry::identifier_for`]), so moving
//! a file is a cache miss and stale identifiers linger harmlessly in the file.
//!
//! ## Storage
//!
//! The cache is a JSON file (`.cache` by default) inside the output
//! directory:
//!
//! ```json
//! { "lastRun": 1700000000000,
//!   "files": { "5f0a…": { "thumbnail": { "observedAt": 1699999999000, "value": true } } } }
//! ```
//!
//! It is loaded once, mutated in memory, and written once at the end of a
//! successful run. The write goes to a temporary sibling file which is then
//! renamed over the old cache, so an interrupted save never leaves a
//! half-written file behind.
//!
//! ## Bypassing the cache
//!
//! `--no-cache` starts from [`Cache::empty`]. Every thumbnail is regenerated
//! and the fresh cache replaces the old one on save.

use crate::entry::{Stamped, epoch_millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

/// Fact recorded when a thumbnail was written for an entry.
pub const FACT_THUMBNAIL: &str = "thumbnail";

/// Fact recorded when a leaf was copied into the output tree.
pub const FACT_COPIED: &str = "copied";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("cache file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A single timestamped observation about an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub observed_at: i64,
    pub value: Value,
}

/// On-disk layout of the cache file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    #[serde(default)]
    last_run: i64,
    #[serde(default)]
    files: BTreeMap<String, BTreeMap<String, Fact>>,
}

/// In-memory fact cache bound to its file path.
#[derive(Debug, Clone)]
pub struct Cache {
    path: PathBuf,
    state: CacheFile,
}

impl Cache {
    /// An empty cache that will be saved to `path` (first build or `--no-cache`).
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: CacheFile::default(),
        }
    }

    /// Load the cache from `path`.
    ///
    /// A missing file yields an empty cache. A file that exists but does not
    /// parse is [`CacheError::Corrupt`].
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cache file, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(e.into()),
        };
        let state: CacheFile = serde_json::from_str(&content).map_err(|source| {
            CacheError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;
        debug!(path = %path.display(), entries = state.files.len(), "loaded cache");
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert `fact` for `entry`, stamped with the entry's source mtime.
    pub fn record(&mut self, entry: &impl Stamped, fact: &str, value: impl Into<Value>) {
        self.state
            .files
            .entry(entry.identifier().to_string())
            .or_default()
            .insert(
                fact.to_string(),
                Fact {
                    observed_at: entry.modified_at(),
                    value: value.into(),
                },
            );
    }

    /// Whether `fact` for `entry` holds `value` and is at least as new as the source.
    pub fn is_valid(&self, entry: &impl Stamped, fact: &str, value: impl Into<Value>) -> bool {
        let expected = value.into();
        self.fact(entry.identifier(), fact)
            .is_some_and(|f| f.value == expected && f.observed_at >= entry.modified_at())
    }

    pub fn fact(&self, identifier: &str, fact: &str) -> Option<&Fact> {
        self.state.files.get(identifier)?.get(fact)
    }

    /// Number of identifiers with at least one recorded fact.
    pub fn len(&self) -> usize {
        self.state.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.files.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.state.files.contains_key(identifier)
    }

    /// Epoch ms of the last successful save (0 if never saved).
    pub fn last_run(&self) -> i64 {
        self.state.last_run
    }

    /// Stamp `lastRun` and atomically replace the cache file.
    pub fn save(&mut self) -> Result<(), CacheError> {
        self.state.last_run = epoch_millis(SystemTime::now());
        let json = serde_json::to_string_pretty(&self.state)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), entries = self.len(), "saved cache");
        Ok(())
    }
}

/// Summary of thumbnail work for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub cached: u32,
    pub generated: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.cached += 1;
    }

    pub fn generate(&mut self) {
        self.generated += 1;
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Thumbnailable leaves seen (skipped kinds excluded).
    pub fn total(&self) -> u32 {
        self.cached + self.generated + self.failed
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cached > 0 {
            write!(
                f,
                "{} cached, {} generated ({} total)",
                self.cached,
                self.generated,
                self.total()
            )?;
        } else {
            write!(f, "{} generated", self.generated)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}
