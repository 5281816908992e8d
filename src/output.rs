//! CLI output formatting for a finished build.
//!
//! # Output Format
//!
//! ```text
//! Scanned 42 files in 5 directories
//! Copied 3 files
//! Thumbnails: 38 cached, 2 generated (41 total), 1 failed, 2 skipped
//!
//! Pages
//!     Home → index.html
//!     trips → 9f2c…e1.html
//!
//! Failures
//!     thumbnail /photos/broken.jpg: decode failed
//!
//! 1 thumbnail(s) failed
//! ```
//!
//! Each section has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::build::BuildReport;
use crate::render::RenderedPage;
use crate::report::{Failure, Stage};
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Page path relative to the output root, or the full path when outside it.
fn page_target(page: &RenderedPage, output: &Path) -> String {
    page.path
        .strip_prefix(output)
        .unwrap_or(page.path.as_path())
        .to_string_lossy()
        .replace('\\', "/")
}

/// `Title → file.html` lines, one per page, root first.
pub fn format_pages(pages: &[RenderedPage], output: &Path) -> Vec<String> {
    // Rendered children-first.
    pages
        .iter()
        .rev()
        .map(|page| {
            format!(
                "{}{} \u{2192} {}",
                indent(1),
                page.title,
                page_target(page, output)
            )
        })
        .collect()
}

pub fn format_failures(failures: &[Failure]) -> Vec<String> {
    failures
        .iter()
        .map(|f| format!("{}{}", indent(1), f))
        .collect()
}

/// Closing line summarizing recoverable failures, if there were any.
pub fn failure_summary(failures: &[Failure]) -> Option<String> {
    let count = |stage: Stage| failures.iter().filter(|f| f.stage == stage).count();
    let mut parts = Vec::new();
    let skipped = count(Stage::Discover);
    if skipped > 0 {
        parts.push(format!("{skipped} file(s) skipped during discovery"));
    }
    let thumbs = count(Stage::Thumbnail);
    if thumbs > 0 {
        parts.push(format!("{thumbs} thumbnail(s) failed"));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Full build summary.
pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Scanned {} in {}",
        plural(report.leaves, "file", "files"),
        plural(report.branches, "directory", "directories")
    )];
    if report.copied > 0 {
        lines.push(format!("Copied {}", plural(report.copied, "file", "files")));
    }
    lines.push(format!("Thumbnails: {}", report.stats));

    lines.push(String::new());
    lines.push("Pages".to_string());
    lines.extend(format_pages(&report.pages, &report.output));

    if !report.failures.is_empty() {
        lines.push(String::new());
        lines.push("Failures".to_string());
        lines.extend(format_failures(&report.failures));
    }
    if let Some(summary) = failure_summary(&report.failures) {
        lines.push(String::new());
        lines.push(summary);
    }
    lines
}

/// Print the build summary to stdout.
pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
