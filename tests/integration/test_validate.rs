//! Tests for the `validate` command

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_validate_reports_order_and_secrets() -> Result<()> {
  let repo = TestRepo::new()?;
  run_shipline(&repo.path, &["init"])?;

  let output = run_shipline_raw(&repo.path, &["validate", "--json"], &[("PYPI_API_TOKEN", "pypi-abc")])?;
  assert!(output.status.success());
  let json = stdout_json(&output)?;

  let stages: Vec<_> = json["stages"]
    .as_array()
    .unwrap()
    .iter()
    .map(|s| s["name"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(stages, vec!["release", "publish", "wheels"]);
  assert_eq!(json["stages"][2]["jobs"], 5);
  assert_eq!(json["stages"][2]["fail_fast"], false);

  let pypi = json["secrets"]
    .as_array()
    .unwrap()
    .iter()
    .find(|s| s["name"] == "PYPI_API_TOKEN")
    .unwrap();
  assert_eq!(pypi["present"], true);

  // Secret values never appear in output
  assert!(!String::from_utf8_lossy(&output.stdout).contains("pypi-abc"));
  Ok(())
}

#[test]
fn test_validate_rejects_cycle() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(
    r#"
[[stages]]
name = "release"
needs = ["publish"]
[[stages.steps]]
type = "run"
run = "true"

[[stages]]
name = "publish"
needs = ["release"]
[[stages.steps]]
type = "run"
run = "true"
"#,
  )?;

  let output = run_shipline_raw(&repo.path, &["validate"], &[])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(String::from_utf8_lossy(&output.stderr).contains("cycle"));
  Ok(())
}

#[test]
fn test_validate_without_pipeline() -> Result<()> {
  let repo = TestRepo::new()?;
  let output = run_shipline_raw(&repo.path, &["validate"], &[])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(String::from_utf8_lossy(&output.stderr).contains("shipline init"));
  Ok(())
}

#[test]
fn test_explicit_config_path() -> Result<()> {
  let repo = TestRepo::new()?;
  let path = repo.outside().join("elsewhere.toml");
  std::fs::write(
    &path,
    "[[stages]]\nname = \"only\"\n[[stages.steps]]\ntype = \"run\"\nrun = \"true\"\n",
  )?;

  let output = run_shipline(&repo.path, &["validate", "--json", "--config", &path.to_string_lossy()])?;
  assert_eq!(stdout_json(&output)?["stages"][0]["name"], "only");
  Ok(())
}
