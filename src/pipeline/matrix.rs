//! Matrix expansion
//!
//! A matrix maps axis names to value lists; a stage with a matrix runs one
//! job per combination. Axes are combined in name order so job keys are
//! stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixConfig {
  pub axes: BTreeMap<String, Vec<String>>,
}

impl MatrixConfig {
  pub fn validate(&self) -> Result<(), String> {
    if self.axes.is_empty() {
      return Err("matrix has no axes".to_string());
    }
    for (axis, values) in &self.axes {
      if values.is_empty() {
        return Err(format!("matrix axis '{}' has no values", axis));
      }
      let mut seen = std::collections::BTreeSet::new();
      for value in values {
        if !seen.insert(value) {
          return Err(format!("matrix axis '{}' repeats value '{}'", axis, value));
        }
      }
    }
    Ok(())
  }

  /// Cartesian product of all axes
  pub fn expand(&self) -> Vec<MatrixJob> {
    let mut combos: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];

    for (axis, values) in &self.axes {
      combos = combos
        .into_iter()
        .flat_map(|combo| {
          values.iter().map(move |value| {
            let mut next = combo.clone();
            next.insert(axis.clone(), value.clone());
            next
          })
        })
        .collect();
    }

    combos.into_iter().map(MatrixJob::new).collect()
  }
}

/// One matrix combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixJob {
  /// Human-readable key, e.g. `python=3.11`
  pub key: String,
  pub values: BTreeMap<String, String>,
}

impl MatrixJob {
  pub fn new(values: BTreeMap<String, String>) -> Self {
    let key = values
      .iter()
      .map(|(axis, value)| format!("{}={}", axis, value))
      .collect::<Vec<_>>()
      .join(",");
    Self { key, values }
  }

  /// The single job of a stage without a matrix
  pub fn single() -> Self {
    Self::new(BTreeMap::new())
  }

  /// Filesystem-safe form of the key, used for worktree directories
  pub fn slug(&self) -> String {
    if self.key.is_empty() {
      return "default".to_string();
    }
    self
      .key
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn matrix(axes: &[(&str, &[&str])]) -> MatrixConfig {
    MatrixConfig {
      axes: axes
        .iter()
        .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
        .collect(),
    }
  }

  #[test]
  fn test_single_axis() {
    let jobs = matrix(&[("python", &["3.9", "3.10", "3.11"])]).expand();
    let keys: Vec<_> = jobs.iter().map(|j| j.key.as_str()).collect();
    assert_eq!(keys, vec!["python=3.9", "python=3.10", "python=3.11"]);
    assert_eq!(jobs[1].values["python"], "3.10");
  }

  #[test]
  fn test_two_axes_product() {
    let jobs = matrix(&[("python", &["3.11", "3.12"]), ("arch", &["x86_64", "aarch64"])]).expand();
    assert_eq!(jobs.len(), 4);
    assert_eq!(jobs[0].key, "arch=x86_64,python=3.11");
    assert_eq!(jobs[3].key, "arch=aarch64,python=3.12");
  }

  #[test]
  fn test_slug() {
    let job = &matrix(&[("python", &["3.11"])]).expand()[0];
    assert_eq!(job.slug(), "python_3.11");
    assert_eq!(MatrixJob::single().slug(), "default");
    assert_eq!(MatrixJob::single().key, "");
  }

  #[test]
  fn test_validate() {
    assert!(matrix(&[("python", &["3.11"])]).validate().is_ok());
    assert!(matrix(&[]).validate().is_err());
    assert!(matrix(&[("python", &[])]).validate().is_err());
    assert!(matrix(&[("python", &["3.11", "3.11"])]).validate().is_err());
  }

  #[test]
  fn test_parse_from_toml() {
    let parsed: MatrixConfig = toml_edit::de::from_str("python = [\"3.12\", \"3.13\"]").unwrap();
    assert_eq!(parsed.expand().len(), 2);
  }
}
