//! Tests for the `plan` command

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_plan_json_resolves_release_tag() -> Result<()> {
  let repo = TestRepo::new()?;
  run_shipline(&repo.path, &["init"])?;

  let params = params("9.9");
  let output = run_shipline(&repo.path, &with_params(&["plan", "--json"], &params))?;
  let plan = stdout_json(&output)?;

  assert_eq!(plan["params"]["version"], "9.9");
  assert_eq!(
    plan["derived"]["docs_api"],
    "https://readthedocs.org/api/v3/projects/avocado-framework/"
  );
  assert_eq!(plan["retention_days"], 3);

  let wheels = &plan["stages"][2];
  assert_eq!(wheels["name"], "wheels");
  assert_eq!(wheels["fail_fast"], false);
  for job in wheels["jobs"].as_array().unwrap() {
    assert_eq!(job["checkout"], "9.9");
  }

  let release_steps = plan["stages"][0]["jobs"][0]["steps"].as_array().unwrap();
  let tag = release_steps
    .iter()
    .find(|s| s["action"]["type"] == "tag")
    .unwrap();
  assert_eq!(tag["action"]["tag"], "9.9");

  // Planning never touches the repository
  assert!(repo.read_file("setup.py")?.contains("VERSION = \"103.0\""));
  Ok(())
}

#[test]
fn test_plan_id_stable_for_same_params() -> Result<()> {
  let repo = TestRepo::new()?;
  run_shipline(&repo.path, &["init"])?;

  let first = params("104.0");
  let second = params("104.1");
  let a = stdout_json(&run_shipline(&repo.path, &with_params(&["plan", "--json"], &first))?)?;
  let b = stdout_json(&run_shipline(&repo.path, &with_params(&["plan", "--json"], &first))?)?;
  let c = stdout_json(&run_shipline(&repo.path, &with_params(&["plan", "--json"], &second))?)?;

  assert_eq!(a["id"], b["id"]);
  assert_ne!(a["id"], c["id"]);
  Ok(())
}

#[test]
fn test_plan_params_from_environment() -> Result<()> {
  let repo = TestRepo::new()?;
  run_shipline(&repo.path, &["init"])?;

  let output = run_shipline_raw(
    &repo.path,
    &["plan"],
    &[
      ("SHIPLINE_VERSION", "105.0"),
      ("SHIPLINE_DEVELOPER_NAME", "Env Dev"),
      ("SHIPLINE_DEVELOPER_EMAIL", "env@example.com"),
      ("SHIPLINE_DOCS_PROJECT", "avocado-framework"),
    ],
  )?;
  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("version 105.0"));
  assert!(stdout.contains("checkout tag 105.0"));
  Ok(())
}

#[test]
fn test_plan_rejects_invalid_version() -> Result<()> {
  let repo = TestRepo::new()?;
  run_shipline(&repo.path, &["init"])?;

  let params = params("1.0 beta");
  let output = run_shipline_raw(&repo.path, &with_params(&["plan"], &params), &[])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(String::from_utf8_lossy(&output.stderr).contains("version"));
  Ok(())
}
