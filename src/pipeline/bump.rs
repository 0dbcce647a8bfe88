//! Version file bumping
//!
//! Regex files replace the first capture group of the first match; TOML files
//! set a dotted key with toml_edit so comments and layout survive.

use crate::core::config::{VersionFile, VersionFileKind};
use crate::core::error::{ShipError, ShipResult, ResultExt};
use std::fs;
use std::path::Path;

/// Write `version` into one version file; returns whether the content changed
pub fn bump_version_file(root: &Path, file: &VersionFile, version: &str) -> ShipResult<bool> {
  let path = root.join(&file.path);
  let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;

  let updated = match file.kind {
    VersionFileKind::Regex => replace_with_pattern(&content, file.pattern.as_deref().unwrap_or_default(), version)
      .with_context(|| format!("Failed to bump {}", file.path.display()))?,
    VersionFileKind::Toml => set_toml_key(&content, file.key.as_deref().unwrap_or_default(), version)
      .with_context(|| format!("Failed to bump {}", file.path.display()))?,
  };

  if updated == content {
    tracing::debug!(path = %file.path.display(), "version already current");
    return Ok(false);
  }

  fs::write(&path, updated).with_context(|| format!("Failed to write {}", path.display()))?;
  tracing::info!(path = %file.path.display(), version, "bumped version");
  Ok(true)
}

fn replace_with_pattern(content: &str, pattern: &str, version: &str) -> ShipResult<String> {
  let re = regex::Regex::new(pattern)?;
  let caps = re
    .captures(content)
    .ok_or_else(|| ShipError::message(format!("pattern '{}' did not match", pattern)))?;
  let group = caps
    .get(1)
    .ok_or_else(|| ShipError::message(format!("pattern '{}' has no version group", pattern)))?;

  let mut out = String::with_capacity(content.len() + version.len());
  out.push_str(&content[..group.start()]);
  out.push_str(version);
  out.push_str(&content[group.end()..]);
  Ok(out)
}

fn set_toml_key(content: &str, key: &str, version: &str) -> ShipResult<String> {
  let mut doc: toml_edit::DocumentMut = content.parse()?;

  if key.is_empty() {
    return Err(ShipError::message("empty TOML key"));
  }

  let mut item = doc.as_item_mut();
  for segment in key.split('.') {
    item = item
      .get_mut(segment)
      .ok_or_else(|| ShipError::message(format!("key '{}' not found", key)))?;
  }

  if !item.is_str() {
    return Err(ShipError::message(format!("key '{}' is not a string", key)));
  }
  *item = toml_edit::value(version);

  Ok(doc.to_string())
}
