//! Progress indicators for stage execution
//!
//! Uses `linya` for concurrency-friendly progress bars: one bar per job,
//! advanced once per finished step, drawn to stderr.

use linya::{Bar, Progress};
use std::sync::{Arc, Mutex};

/// Thread-safe set of per-job bars for one stage
#[derive(Clone)]
pub struct StageProgress {
  progress: Arc<Mutex<Progress>>,
}

impl StageProgress {
  pub fn new() -> Self {
    Self {
      progress: Arc::new(Mutex::new(Progress::new())),
    }
  }

  /// Add a bar for a job with `steps` steps; `None` if the lock is poisoned
  pub fn add_job(&self, steps: usize, label: impl Into<String>) -> Option<Bar> {
    let mut progress = self.progress.lock().ok()?;
    Some(progress.bar(steps.max(1), label.into()))
  }

  /// Advance a job by one step
  pub fn step_done(&self, bar: &Bar) {
    if let Ok(mut progress) = self.progress.lock() {
      progress.inc_and_draw(bar, 1);
    }
  }

  /// Fill a job's bar, used when the remaining steps will not run
  pub fn finish(&self, bar: &Bar, steps: usize) {
    if let Ok(mut progress) = self.progress.lock() {
      progress.set_and_draw(bar, steps.max(1));
    }
  }
}

impl Default for StageProgress {
  fn default() -> Self {
    Self::new()
  }
}
