//! Run parameters, derived values and template rendering
//!
//! Parameters are supplied once per run and never change afterwards. Step
//! commands, tags, checkout refs and artifact names refer to them through
//! `{{ name }}` placeholders, and every step also sees them as `SHIPLINE_*`
//! environment variables.

use crate::core::config::PipelineMeta;
use crate::core::error::{ShipResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameters supplied at invocation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
  pub version: String,
  pub developer_name: String,
  pub developer_email: String,
  pub docs_project: String,
}

impl RunParams {
  /// Validate every parameter, reporting the first problem found
  pub fn validate(&self) -> ShipResult<()> {
    validate_tag_name(&self.version).map_err(|reason| invalid("version", reason))?;

    if self.developer_name.trim().is_empty() {
      return Err(invalid("developer_name", "must not be empty"));
    }

    validate_email(&self.developer_email).map_err(|reason| invalid("developer_email", reason))?;

    if self.docs_project.is_empty()
      || !self
        .docs_project
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
      return Err(invalid(
        "docs_project",
        "must be a slug of letters, digits, '-' or '_'",
      ));
    }

    Ok(())
  }

  /// Compute values derived from the parameters and pipeline settings
  pub fn derive(&self, meta: &PipelineMeta) -> DerivedValues {
    DerivedValues {
      interpreter: resolve_in_path(&meta.interpreter),
      docs_api: format!(
        "{}/projects/{}/",
        meta.docs_api_base.trim_end_matches('/'),
        self.docs_project
      ),
    }
  }
}

fn invalid(name: &str, reason: impl Into<String>) -> crate::core::error::ShipError {
  ValidationError::InvalidParam {
    name: name.to_string(),
    reason: reason.into(),
  }
  .into()
}

/// Git tag name rules (subset of `git check-ref-format` that matters for versions)
fn validate_tag_name(version: &str) -> Result<(), &'static str> {
  if version.is_empty() {
    return Err("must not be empty");
  }
  if version.chars().any(|c| c.is_whitespace() || c.is_control()) {
    return Err("must not contain whitespace");
  }
  if version.chars().any(|c| matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')) {
    return Err("must not contain any of ~ ^ : ? * [ \\");
  }
  if version.contains("..") || version.contains("@{") || version.contains("//") {
    return Err("must not contain '..', '@{' or '//'");
  }
  if version.starts_with('-') || version.starts_with('/') || version.starts_with('.') {
    return Err("must not start with '-', '/' or '.'");
  }
  if version.ends_with('/') || version.ends_with('.') || version.ends_with(".lock") {
    return Err("must not end with '/', '.' or '.lock'");
  }
  Ok(())
}

fn validate_email(email: &str) -> Result<(), &'static str> {
  let mut parts = email.split('@');
  match (parts.next(), parts.next(), parts.next()) {
    (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => {
      if email.chars().any(char::is_whitespace) {
        Err("must not contain whitespace")
      } else {
        Ok(())
      }
    }
    _ => Err("must look like name@domain"),
  }
}

/// Values computed from the parameters, exposed alongside them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedValues {
  pub interpreter: PathBuf,
  pub docs_api: String,
}

/// Search PATH for an executable; falls back to the name as given
fn resolve_in_path(name: &str) -> PathBuf {
  let candidate = Path::new(name);
  if candidate.components().count() > 1 {
    return candidate.to_path_buf();
  }

  std::env::var_os("PATH")
    .and_then(|paths| {
      std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
    })
    .unwrap_or_else(|| candidate.to_path_buf())
}

/// Names of the `{{ name }}` placeholders in a template
pub fn template_names(template: &str) -> impl Iterator<Item = &str> {
  template
    .split("{{")
    .skip(1)
    .filter_map(|chunk| chunk.split_once("}}").map(|(name, _)| name.trim()))
}

/// Template variable scope for one job
#[derive(Debug, Clone)]
pub struct Vars {
  values: BTreeMap<String, String>,
  matrix: BTreeMap<String, String>,
  developer_name: String,
  developer_email: String,
}

impl Vars {
  /// Scope with the run parameters and derived values
  pub fn new(params: &RunParams, derived: &DerivedValues) -> Self {
    let mut values = BTreeMap::new();
    values.insert("version".to_string(), params.version.clone());
    values.insert("developer_name".to_string(), params.developer_name.clone());
    values.insert("developer_email".to_string(), params.developer_email.clone());
    values.insert("docs_project".to_string(), params.docs_project.clone());
    values.insert(
      "interpreter".to_string(),
      derived.interpreter.to_string_lossy().to_string(),
    );
    values.insert("docs_api".to_string(), derived.docs_api.clone());

    Self {
      values,
      matrix: BTreeMap::new(),
      developer_name: params.developer_name.clone(),
      developer_email: params.developer_email.clone(),
    }
  }

  /// Same scope extended with one matrix combination
  pub fn with_matrix(&self, matrix: &BTreeMap<String, String>) -> Self {
    let mut vars = self.clone();
    vars.matrix = matrix.clone();
    vars
  }

  fn lookup(&self, name: &str) -> Option<&str> {
    match name.strip_prefix("matrix.") {
      Some(axis) => self.matrix.get(axis).map(String::as_str),
      None => self.values.get(name).map(String::as_str),
    }
  }

  /// Replace every `{{ name }}` placeholder in a template
  pub fn render(&self, template: &str) -> ShipResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
      out.push_str(&rest[..start]);
      let after = &rest[start + 2..];
      let Some(end) = after.find("}}") else {
        // Unterminated braces are literal text
        out.push_str(&rest[start..]);
        return Ok(out);
      };

      let name = after[..end].trim();
      let value = self.lookup(name).ok_or_else(|| ValidationError::UnknownVariable {
        name: name.to_string(),
        template: template.to_string(),
      })?;
      out.push_str(value);
      rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
  }

  /// Environment exported to every step of the job
  pub fn env(&self) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for (name, value) in &self.values {
      env.insert(format!("SHIPLINE_{}", name.to_uppercase()), value.clone());
    }
    for (axis, value) in &self.matrix {
      let key = axis
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect::<String>();
      env.insert(format!("SHIPLINE_MATRIX_{}", key), value.clone());
    }

    env.insert("GIT_AUTHOR_NAME".to_string(), self.developer_name.clone());
    env.insert("GIT_AUTHOR_EMAIL".to_string(), self.developer_email.clone());
    env.insert("GIT_COMMITTER_NAME".to_string(), self.developer_name.clone());
    env.insert("GIT_COMMITTER_EMAIL".to_string(), self.developer_email.clone());
    env
  }
}

#[cfg(test)]
pub(crate) fn sample_params(version: &str) -> RunParams {
  RunParams {
    version: version.to_string(),
    developer_name: "Release Bot".to_string(),
    developer_email: "release@example.com".to_string(),
    docs_project: "avocado-framework".to_string(),
  }
}
