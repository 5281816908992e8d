//! Progress events.
//!
//! Stages report `(label, percent)` pairs through a [`ProgressReporter`].
//! Reporting is purely observational: nothing in the pipeline reads it back.
//! Each stage owns a [`ProgressContext`] holding its counters, so there is no
//! global state and stages can be tested with a recording reporter.

use tracing::info;

pub trait ProgressReporter {
    /// `percent` is `None` when the stage does not know its total.
    fn report(&mut self, label: &str, percent: Option<f64>);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _label: &str, _percent: Option<f64>) {}
}

/// Emits each event as a `tracing` info event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&mut self, label: &str, percent: Option<f64>) {
        match percent {
            Some(p) => info!("[{:>5.1}%] {}", p, label),
            None => info!("{}", label),
        }
    }
}

/// Counters for one stage.
pub struct ProgressContext<'r> {
    stage: &'static str,
    total: Option<usize>,
    done: usize,
    reporter: &'r mut dyn ProgressReporter,
}

impl<'r> ProgressContext<'r> {
    pub fn new(
        stage: &'static str,
        total: Option<usize>,
        reporter: &'r mut dyn ProgressReporter,
    ) -> Self {
        Self {
            stage,
            total,
            done: 0,
            reporter,
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Percent complete, capped at 100. A zero total counts as complete.
    pub fn percent(&self) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.done as f64 / total as f64 * 100.0).min(100.0)
            }
        })
    }

    /// Count one item as done and emit `"<stage>: <item>"`.
    pub fn advance(&mut self, item: &str) {
        self.done += 1;
        let label = format!("{}: {}", self.stage, item);
        let percent = self.percent();
        self.reporter.report(&label, percent);
    }
}
