//! Shared test utilities for the thumbgal test suite.
//!
//! Provides source-tree fixtures and recording stand-ins for the progress
//! reporter and page compiler. Codec mocks live next to their traits in
//! [`crate::imaging::backend::tests`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_tree(tmp.path(), &["a.jpg", "trips/b.mp4"]);
//!
//! let mut progress = RecordingProgress::default();
//! // ... run a stage with &mut progress ...
//! assert_eq!(progress.events.len(), 2);
//! ```

use std::path::Path;
use std::sync::Mutex;

use crate::progress::ProgressReporter;
use crate::render::{CompileError, PageCompiler, PageModel};

// =========================================================================
// Fixture setup
// =========================================================================

/// Create every listed file (and its parent directories) under `root`.
///
/// File contents are the relative path itself, which is enough for stages
/// that never decode media.
pub fn write_tree(root: &Path, files: &[&str]) {
    for rel in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, rel.as_bytes()).unwrap();
    }
}

// =========================================================================
// Progress
// =========================================================================

/// Collects every `(label, percent)` event.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub events: Vec<(String, Option<f64>)>,
}

impl ProgressReporter for RecordingProgress {
    fn report(&mut self, label: &str, percent: Option<f64>) {
        self.events.push((label.to_string(), percent));
    }
}

// =========================================================================
// Page compiler
// =========================================================================

/// Renders the model as pretty JSON and remembers each page title.
#[derive(Default)]
pub struct MockCompiler {
    pub pages: Mutex<Vec<PageModel>>,
    pub fail: bool,
}

impl MockCompiler {
    pub fn failing() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.title.clone())
            .collect()
    }
}

impl PageCompiler for MockCompiler {
    fn render(&self, model: &PageModel) -> Result<String, CompileError> {
        if self.fail {
            return Err(CompileError("mock compiler failure".into()));
        }
        self.pages.lock().unwrap().push(model.clone());
        serde_json::to_string_pretty(model).map_err(|e| CompileError(e.to_string()))
    }
}
