//! Run reports
//!
//! Every run writes `.shipline/runs/<run-id>.json` describing what happened to
//! each stage, job and step. Error text in a report has already been passed
//! through secret redaction.

use crate::core::error::{ShipResult, ResultExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
  Success,
  Failed,
  /// Stopped because a sibling job failed in a fail-fast stage
  Cancelled,
  /// Never started because something it depends on did not succeed
  Skipped,
}

impl Status {
  pub fn icon(self) -> &'static str {
    match self {
      Status::Success => "✅",
      Status::Failed => "❌",
      Status::Cancelled => "⏹️",
      Status::Skipped => "⏭️",
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Status::Success => "success",
      Status::Failed => "failed",
      Status::Cancelled => "cancelled",
      Status::Skipped => "skipped",
    };
    write!(f, "{}", s)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id: String,
  pub plan_id: String,
  pub pipeline: String,
  pub version: String,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
  pub name: String,
  pub status: Status,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
  pub started_at: Option<DateTime<Utc>>,
  pub finished_at: Option<DateTime<Utc>>,
  pub jobs: Vec<JobReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
  pub key: String,
  pub status: Status,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub checkout: Option<CheckoutRecord>,
  pub duration_ms: u64,
  pub steps: Vec<StepReport>,
}

/// The tag a job actually ran on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRecord {
  pub tag: String,
  pub commit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
  pub name: String,
  pub status: Status,
  pub duration_ms: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl RunReport {
  pub fn succeeded(&self) -> bool {
    self.stages.iter().all(|s| s.status == Status::Success)
  }

  /// Names of stages that did not succeed, in execution order
  pub fn unsuccessful_stages(&self) -> Vec<String> {
    self
      .stages
      .iter()
      .filter(|s| s.status != Status::Success)
      .map(|s| s.name.clone())
      .collect()
  }

  #[cfg(test)]
  pub fn stage(&self, name: &str) -> Option<&StageReport> {
    self.stages.iter().find(|s| s.name == name)
  }

  pub fn report_path(runs_dir: &Path, run_id: &str) -> PathBuf {
    runs_dir.join(format!("{}.json", run_id))
  }

  /// Write the report to `<runs_dir>/<run-id>.json`
  pub fn save(&self, runs_dir: &Path) -> ShipResult<PathBuf> {
    fs::create_dir_all(runs_dir).with_context(|| format!("Failed to create {}", runs_dir.display()))?;
    let path = Self::report_path(runs_dir, &self.run_id);
    let json = serde_json::to_string_pretty(self)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
  }
}

impl StageReport {
  /// A stage whose needs did not all succeed
  pub fn skipped(name: &str, reason: impl Into<String>) -> Self {
    Self {
      name: name.to_string(),
      status: Status::Skipped,
      reason: Some(reason.into()),
      started_at: None,
      finished_at: None,
      jobs: Vec::new(),
    }
  }

  /// Stage status from its job outcomes
  pub fn status_from_jobs(jobs: &[JobReport]) -> Status {
    if jobs.iter().all(|j| j.status == Status::Success) {
      Status::Success
    } else {
      Status::Failed
    }
  }

  pub fn count(&self, status: Status) -> usize {
    self.jobs.iter().filter(|j| j.status == status).count()
  }
}
