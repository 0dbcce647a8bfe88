//! Artifact manifest: what was uploaded, when, and how long it is kept

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
  pub name: String,
  pub run_id: String,
  pub created_at: DateTime<Utc>,
  pub retention_days: u32,
  pub files: Vec<ArtifactFile>,
}

/// One stored file, path relative to the artifact root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
  pub path: PathBuf,
  pub size: u64,
  pub sha256: String,
}

impl ArtifactManifest {
  /// End of the retention window; saturates at the latest representable time
  pub fn expires_at(&self) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(self.retention_days))
      .and_then(|window| self.created_at.checked_add_signed(window))
      .unwrap_or(DateTime::<Utc>::MAX_UTC)
  }

  /// Expired once the retention window has fully elapsed
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at()
  }

  pub fn total_size(&self) -> u64 {
    self.files.iter().map(|f| f.size).sum()
  }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  format!("{:x}", hasher.finalize())
}
