//! Process-wide secrets
//!
//! Loaded from the environment once at startup, by the names the pipeline
//! declares. Values never reach disk, logs or reports: anything printed goes
//! through [`SecretStore::redact`] first.

use crate::core::error::{ShipError, ShipResult};
use std::collections::BTreeMap;
use std::fmt;

const MASK: &str = "***";

/// Named secret values for one run
#[derive(Clone, Default)]
pub struct SecretStore {
  values: BTreeMap<String, String>,
}

impl SecretStore {
  /// Read each named variable from the process environment
  pub fn from_env<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
    let mut values = BTreeMap::new();
    for name in names {
      match std::env::var(name) {
        Ok(value) if !value.is_empty() => {
          values.insert(name.to_string(), value);
        }
        _ => tracing::debug!(secret = name, "secret not present in environment"),
      }
    }
    Self { values }
  }

  #[cfg(test)]
  pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
    Self {
      values: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
  }

  /// Get a secret or fail with an authentication error
  pub fn require(&self, name: &str) -> ShipResult<&str> {
    self.values.get(name).map(String::as_str).ok_or_else(|| ShipError::Auth {
      secret: name.to_string(),
      reason: "secret is not set".to_string(),
    })
  }

  pub fn contains(&self, name: &str) -> bool {
    self.values.contains_key(name)
  }

  /// Names of the secrets that are present
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  /// Mask every secret value occurring in `text`
  pub fn redact(&self, text: &str) -> String {
    let mut values: Vec<&str> = self.values.values().map(String::as_str).collect();
    // Longest first so a secret containing another is masked whole
    values.sort_by_key(|v| std::cmp::Reverse(v.len()));

    let mut out = text.to_string();
    for value in values {
      if out.contains(value) {
        out = out.replace(value, MASK);
      }
    }
    out
  }
}

impl fmt::Debug for SecretStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SecretStore")
      .field("names", &self.values.keys().collect::<Vec<_>>())
      .finish()
  }
}
