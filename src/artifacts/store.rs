//! Filesystem artifact store
//!
//! Layout: `<root>/<run-id>/<name>/` holds the uploaded files (relative
//! layout preserved) next to `manifest.json`. Names are unique per run.
//! Downloads re-hash every file so the consumer gets exactly the bytes the
//! producer uploaded.

use super::manifest::{ArtifactFile, ArtifactManifest, MANIFEST_FILE, sha256_hex};
use crate::core::error::{ArtifactError, ShipResult, ResultExt};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct ArtifactStore {
  root: PathBuf,
  /// Serializes the exists-check and manifest write of concurrent uploads
  upload_lock: Mutex<()>,
}

impl ArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      upload_lock: Mutex::new(()),
    }
  }

  /// Store under `<repo>/.shipline/artifacts`
  pub fn for_repo(repo_root: &Path) -> Self {
    Self::new(repo_root.join(".shipline").join("artifacts"))
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn artifact_dir(&self, run_id: &str, name: &str) -> PathBuf {
    self.root.join(run_id).join(encode_name(name))
  }

  /// Upload files matching `pattern` (relative to `base`)
  pub fn upload(
    &self,
    run_id: &str,
    name: &str,
    base: &Path,
    pattern: &str,
    retention_days: u32,
    now: DateTime<Utc>,
  ) -> ShipResult<ArtifactManifest> {
    let full_pattern = format!(
      "{}/{}",
      glob::Pattern::escape(&base.to_string_lossy()),
      pattern.trim_start_matches("./")
    );
    let mut sources = Vec::new();
    for entry in glob::glob(&full_pattern)? {
      let path = entry?;
      if path.is_file() {
        sources.push(path);
      }
    }
    sources.sort();

    if sources.is_empty() {
      return Err(
        ArtifactError::NoFiles {
          name: name.to_string(),
          pattern: pattern.to_string(),
        }
        .into(),
      );
    }

    let _guard = self.upload_lock.lock().map_err(|_| "artifact store lock poisoned")?;

    let dir = self.artifact_dir(run_id, name);
    if dir.join(MANIFEST_FILE).exists() {
      return Err(ArtifactError::AlreadyExists { name: name.to_string() }.into());
    }
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut files = Vec::with_capacity(sources.len());
    for source in &sources {
      let relative = source.strip_prefix(base).unwrap_or(source.as_path()).to_path_buf();
      let bytes = fs::read(source).with_context(|| format!("Failed to read {}", source.display()))?;

      let dest = dir.join(&relative);
      if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::write(&dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;

      files.push(ArtifactFile {
        path: relative,
        size: bytes.len() as u64,
        sha256: sha256_hex(&bytes),
      });
    }

    let manifest = ArtifactManifest {
      name: name.to_string(),
      run_id: run_id.to_string(),
      created_at: now,
      retention_days,
      files,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;

    tracing::info!(
      artifact = name,
      run_id,
      files = manifest.files.len(),
      bytes = manifest.total_size(),
      "uploaded artifact"
    );
    Ok(manifest)
  }

  /// Read an artifact's manifest
  pub fn manifest(&self, run_id: &str, name: &str) -> ShipResult<ArtifactManifest> {
    let path = self.artifact_dir(run_id, name).join(MANIFEST_FILE);
    if !path.exists() {
      return Err(
        ArtifactError::NotFound {
          name: name.to_string(),
          run_id: run_id.to_string(),
        }
        .into(),
      );
    }
    read_manifest(&path)
  }

  /// Copy an artifact's files into `dest`, verifying every checksum
  pub fn download(&self, run_id: &str, name: &str, dest: &Path, now: DateTime<Utc>) -> ShipResult<ArtifactManifest> {
    let manifest = self.manifest(run_id, name)?;
    if manifest.is_expired(now) {
      return Err(
        ArtifactError::Expired {
          name: name.to_string(),
          expired_at: manifest.expires_at().to_rfc3339(),
        }
        .into(),
      );
    }

    let dir = self.artifact_dir(run_id, name);
    fs::create_dir_all(dest).with_context(|| format!("Failed to create {}", dest.display()))?;

    for file in &manifest.files {
      let stored = dir.join(&file.path);
      let bytes = fs::read(&stored).with_context(|| format!("Failed to read {}", stored.display()))?;
      if sha256_hex(&bytes) != file.sha256 {
        return Err(
          ArtifactError::Corrupt {
            name: name.to_string(),
            file: file.path.display().to_string(),
          }
          .into(),
        );
      }

      let target = dest.join(&file.path);
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::write(&target, &bytes).with_context(|| format!("Failed to write {}", target.display()))?;
    }

    tracing::info!(artifact = name, run_id, dest = %dest.display(), "downloaded artifact");
    Ok(manifest)
  }

  /// Every manifest in the store, oldest first
  pub fn list(&self) -> ShipResult<Vec<ArtifactManifest>> {
    let mut manifests = Vec::new();
    if !self.root.exists() {
      return Ok(manifests);
    }

    for run in fs::read_dir(&self.root)? {
      let run = run?;
      if !run.file_type()?.is_dir() {
        continue;
      }
      for artifact in fs::read_dir(run.path())? {
        let manifest_path = artifact?.path().join(MANIFEST_FILE);
        if !manifest_path.is_file() {
          continue;
        }
        match read_manifest(&manifest_path) {
          Ok(manifest) => manifests.push(manifest),
          Err(e) => tracing::warn!(path = %manifest_path.display(), error = %e, "skipping unreadable manifest"),
        }
      }
    }

    manifests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    Ok(manifests)
  }

  /// Expired artifacts as of `now`
  pub fn expired(&self, now: DateTime<Utc>) -> ShipResult<Vec<ArtifactManifest>> {
    Ok(self.list()?.into_iter().filter(|m| m.is_expired(now)).collect())
  }

  /// Delete expired artifacts (and run directories left empty)
  pub fn prune(&self, now: DateTime<Utc>) -> ShipResult<Vec<ArtifactManifest>> {
    let expired = self.expired(now)?;
    for manifest in &expired {
      let dir = self.artifact_dir(&manifest.run_id, &manifest.name);
      fs::remove_dir_all(&dir).with_context(|| format!("Failed to remove {}", dir.display()))?;

      let run_dir = self.root.join(&manifest.run_id);
      if fs::read_dir(&run_dir).map(|mut d| d.next().is_none()).unwrap_or(false) {
        fs::remove_dir(&run_dir)?;
      }
      tracing::info!(artifact = %manifest.name, run_id = %manifest.run_id, "pruned expired artifact");
    }
    Ok(expired)
  }
}

fn read_manifest(path: &Path) -> ShipResult<ArtifactManifest> {
  let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
  Ok(serde_json::from_slice(&content)?)
}

/// Artifact names may contain characters unsafe in paths
fn encode_name(name: &str) -> String {
  let encoded: String = name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
    .collect();
  if encoded.starts_with('.') {
    format!("_{}", encoded)
  } else {
    encoded
  }
}
