//! Tests for the `artifacts` commands

use crate::helpers::*;
use anyhow::Result;
use serde_json::Value;

const PIPELINE: &str = r#"
[pipeline]
artifact_retention_days = 3

[[stages]]
name = "release"

[[stages.steps]]
type = "run"
run = "mkdir -p dist && echo sdist > dist/avocado-{{ version }}.tar.gz"

[[stages.steps]]
type = "upload-artifact"
artifact = "sdist"
path = "dist/*.tar.gz"
"#;

fn release(repo: &TestRepo) -> Result<String> {
  let params = params("9.9");
  let output = run_shipline(&repo.path, &with_params(&["run", "--json"], &params))?;
  Ok(stdout_json(&output)?["run_id"].as_str().unwrap_or_default().to_string())
}

/// Move an artifact's creation time back by `days`
fn age_artifact(repo: &TestRepo, run_id: &str, name: &str, days: i64) -> Result<()> {
  let path = repo
    .path
    .join(".shipline/artifacts")
    .join(run_id)
    .join(name)
    .join("manifest.json");
  let mut manifest: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
  let created = chrono::DateTime::parse_from_rfc3339(manifest["created_at"].as_str().unwrap_or_default())?;
  manifest["created_at"] = Value::String((created - chrono::Duration::days(days)).to_rfc3339());
  std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
  Ok(())
}

#[test]
fn test_list_shows_uploaded_artifact() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(PIPELINE)?;
  let run_id = release(&repo)?;

  let output = run_shipline(&repo.path, &["artifacts", "list", "--json"])?;
  let list = stdout_json(&output)?;
  let entries = list.as_array().unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0]["name"], "sdist");
  assert_eq!(entries[0]["run_id"], run_id.as_str());
  assert_eq!(entries[0]["retention_days"], 3);
  assert_eq!(entries[0]["files"][0]["path"], "dist/avocado-9.9.tar.gz");
  Ok(())
}

#[test]
fn test_prune_after_three_days() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(PIPELINE)?;
  let run_id = release(&repo)?;

  // Two days old: still retained
  age_artifact(&repo, &run_id, "sdist", 2)?;
  let output = run_shipline(&repo.path, &["artifacts", "prune", "--json"])?;
  assert!(stdout_json(&output)?.as_array().unwrap().is_empty());

  // Past three days: expired
  age_artifact(&repo, &run_id, "sdist", 1)?;
  let dry = run_shipline(&repo.path, &["artifacts", "prune", "--dry-run", "--json"])?;
  assert_eq!(stdout_json(&dry)?.as_array().unwrap().len(), 1);
  assert!(repo.path.join(".shipline/artifacts").join(&run_id).exists());

  let output = run_shipline(&repo.path, &["artifacts", "prune"])?;
  assert!(String::from_utf8_lossy(&output.stdout).contains("Removed 1 expired artifact"));
  assert!(!repo.path.join(".shipline/artifacts").join(&run_id).exists());

  let list = run_shipline(&repo.path, &["artifacts", "list", "--json"])?;
  assert!(stdout_json(&list)?.as_array().unwrap().is_empty());
  Ok(())
}

#[test]
fn test_list_empty_store() -> Result<()> {
  let repo = TestRepo::new()?;
  let output = run_shipline(&repo.path, &["artifacts", "list"])?;
  assert!(String::from_utf8_lossy(&output.stdout).contains("No artifacts"));
  Ok(())
}
