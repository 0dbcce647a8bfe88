//! End-to-end tests for the `run` command against a local bare remote

use crate::helpers::*;
use anyhow::Result;
use serde_json::Value;

const TOKEN: &str = "ghp-integration-secret-0001";

/// Release pipeline with the default shape but local-only commands
fn pipeline(wheel_check: &str) -> String {
  format!(
    r#"
[pipeline]
name = "release"
artifact_retention_days = 3

[[version_files]]
path = "setup.py"
pattern = 'VERSION = "([^"]*)"'

[[version_files]]
path = "python-avocado.spec"
pattern = 'Version: (\S+)'

[[stages]]
name = "release"

[[stages.steps]]
type = "bump-version"

[[stages.steps]]
type = "commit"

[[stages.steps]]
type = "tag"

[[stages.steps]]
type = "push"
token_secret = "RELEASE_TOKEN"

[[stages.steps]]
name = "Build source distribution"
type = "run"
run = "mkdir -p dist && head -c 2048 /dev/urandom > dist/avocado-{{{{ version }}}}.tar.gz"

[[stages.steps]]
type = "upload-artifact"
artifact = "sdist"
path = "dist/*.tar.gz"

[[stages]]
name = "publish"
needs = ["release"]

[[stages.steps]]
type = "download-artifact"
artifact = "sdist"
into = "incoming"

[[stages.steps]]
name = "Upload to package index"
type = "run"
run = "cmp incoming/dist/avocado-{{{{ version }}}}.tar.gz dist/avocado-{{{{ version }}}}.tar.gz && mkdir -p ../index && cp incoming/dist/* ../index/"

[[stages]]
name = "wheels"
needs = ["release"]
checkout = "{{{{ version }}}}"
fail_fast = false

[stages.matrix]
python = ["3.11", "3.12", "3.13"]

[[stages.steps]]
name = "Build wheel"
type = "run"
run = "{wheel_check} && mkdir -p dist && git describe --tags --exact-match > dist/tag.txt && grep -c 'VERSION = \"{{{{ version }}}}\"' setup.py > dist/version-lines.txt"

[[stages.steps]]
type = "upload-artifact"
artifact = "wheel-py{{{{ matrix.python }}}}"
path = "dist/*.txt"
"#
  )
}

fn run_release(repo: &TestRepo, version: &str) -> Result<(std::process::Output, Value)> {
  let params = params(version);
  let output = run_shipline_raw(
    &repo.path,
    &with_params(&["run", "--json"], &params),
    &[("RELEASE_TOKEN", TOKEN)],
  )?;
  let report = stdout_json(&output)?;
  Ok((output, report))
}

fn stage<'a>(report: &'a Value, name: &str) -> &'a Value {
  report["stages"]
    .as_array()
    .unwrap()
    .iter()
    .find(|s| s["name"] == name)
    .unwrap()
}

#[test]
fn test_full_release_pipeline() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(&pipeline("true"))?;

  let (output, report) = run_release(&repo, "9.9")?;
  assert!(
    output.status.success(),
    "stderr: {}",
    String::from_utf8_lossy(&output.stderr)
  );

  // Version files bumped, committed, tagged and pushed
  assert!(repo.read_file("setup.py")?.contains("VERSION = \"9.9\""));
  assert!(repo.read_file("python-avocado.spec")?.contains("Version: 9.9"));
  assert_eq!(repo.origin_tags()?, vec!["9.9".to_string()]);
  assert_eq!(repo.origin_subject("main")?, "Release 9.9");

  // The package index received the exact bytes built in the release stage
  let built = std::fs::read(repo.path.join("dist/avocado-9.9.tar.gz"))?;
  let published = std::fs::read(repo.outside().join("index/avocado-9.9.tar.gz"))?;
  assert_eq!(built, published);

  // Every matrix job checked out exactly the release tag
  let wheels = stage(&report, "wheels");
  assert_eq!(wheels["status"], "success");
  let jobs = wheels["jobs"].as_array().unwrap();
  assert_eq!(jobs.len(), 3);
  for job in jobs {
    assert_eq!(job["checkout"]["tag"], "9.9");
  }

  let run_id = report["run_id"].as_str().unwrap();
  for python in ["3.11", "3.12", "3.13"] {
    let dir = repo
      .path
      .join(".shipline/artifacts")
      .join(run_id)
      .join(format!("wheel-py{}", python))
      .join("dist");
    assert_eq!(std::fs::read_to_string(dir.join("tag.txt"))?.trim(), "9.9");
    assert_eq!(std::fs::read_to_string(dir.join("version-lines.txt"))?.trim(), "1");
  }

  // Worktrees are cleaned up, the report stays
  assert!(!repo.path.join(".shipline/work").join(run_id).exists());
  assert!(repo.path.join(".shipline/runs").join(format!("{}.json", run_id)).exists());
  Ok(())
}

#[test]
fn test_release_stage_finishes_before_dependents() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(&pipeline("true"))?;

  let (output, report) = run_release(&repo, "9.9")?;
  assert!(output.status.success());

  let release_done = stage(&report, "release")["finished_at"].as_str().unwrap().to_string();
  for dependent in ["publish", "wheels"] {
    let started = stage(&report, dependent)["started_at"].as_str().unwrap().to_string();
    let release_done = chrono::DateTime::parse_from_rfc3339(&release_done)?;
    let started = chrono::DateTime::parse_from_rfc3339(&started)?;
    assert!(release_done <= started, "{} started before release finished", dependent);
  }
  Ok(())
}

#[test]
fn test_failed_wheel_does_not_cancel_siblings() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(&pipeline("test $SHIPLINE_MATRIX_PYTHON != 3.12"))?;

  let (output, report) = run_release(&repo, "9.9")?;
  assert_eq!(output.status.code(), Some(4));

  assert_eq!(stage(&report, "release")["status"], "success");
  assert_eq!(stage(&report, "publish")["status"], "success");

  let wheels = stage(&report, "wheels");
  assert_eq!(wheels["status"], "failed");
  for job in wheels["jobs"].as_array().unwrap() {
    let expected = if job["key"] == "python=3.12" { "failed" } else { "success" };
    assert_eq!(job["status"], expected, "job {}", job["key"]);
  }

  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("wheels"));
  Ok(())
}

#[test]
fn test_failed_release_skips_publish_and_wheels() -> Result<()> {
  let repo = TestRepo::new()?;
  // Version already current: nothing to commit
  repo.write_pipeline(&pipeline("true"))?;

  let (output, report) = run_release(&repo, "103.0")?;
  assert_eq!(output.status.code(), Some(4));

  assert_eq!(stage(&report, "release")["status"], "failed");
  assert_eq!(stage(&report, "publish")["status"], "skipped");
  assert_eq!(stage(&report, "wheels")["status"], "skipped");
  assert!(repo.origin_tags()?.is_empty());
  Ok(())
}

#[test]
fn test_existing_tag_is_not_moved() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(&pipeline("true"))?;
  git(&repo.path, &["tag", "9.9"])?;
  let before = git(&repo.path, &["rev-parse", "9.9"])?;

  let (output, report) = run_release(&repo, "9.9")?;
  assert_eq!(output.status.code(), Some(4));
  assert_eq!(stage(&report, "release")["status"], "failed");

  let after = git(&repo.path, &["rev-parse", "9.9"])?;
  assert_eq!(before.stdout, after.stdout);
  Ok(())
}

#[test]
fn test_token_never_printed() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(
    r#"
[[stages]]
name = "publish"

[[stages.steps]]
name = "Upload to package index"
type = "run"
run = "echo \"upload rejected for token $RELEASE_TOKEN\" >&2; exit 1"
secrets = ["RELEASE_TOKEN"]
"#,
  )?;

  let params = params("9.9");
  let output = run_shipline_raw(
    &repo.path,
    &with_params(&["-vv", "run"], &params),
    &[("RELEASE_TOKEN", TOKEN)],
  )?;
  assert_eq!(output.status.code(), Some(4));

  let stdout = String::from_utf8_lossy(&output.stdout);
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(!stdout.contains(TOKEN));
  assert!(!stderr.contains(TOKEN));
  assert!(stdout.contains("upload rejected for token ***"));

  for entry in std::fs::read_dir(repo.path.join(".shipline/runs"))? {
    let report = std::fs::read_to_string(entry?.path())?;
    assert!(!report.contains(TOKEN));
  }
  Ok(())
}

#[test]
fn test_missing_secret_fails_step() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(&pipeline("true"))?;

  let params = params("9.9");
  let output = run_shipline_raw(&repo.path, &with_params(&["run", "--json"], &params), &[])?;
  assert_eq!(output.status.code(), Some(4));

  let report = stdout_json(&output)?;
  let steps = stage(&report, "release")["jobs"][0]["steps"].as_array().unwrap();
  let push = steps.iter().find(|s| s["status"] == "failed").unwrap();
  assert!(push["error"].as_str().unwrap().contains("RELEASE_TOKEN"));
  // Nothing reached the remote
  assert!(repo.origin_tags()?.is_empty());
  Ok(())
}

#[test]
fn test_dry_run_executes_nothing() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline(&pipeline("true"))?;

  let params = params("9.9");
  let output = run_shipline(&repo.path, &with_params(&["run", "--dry-run", "--json"], &params))?;
  let plan = stdout_json(&output)?;
  assert_eq!(plan["params"]["version"], "9.9");

  assert!(repo.read_file("setup.py")?.contains("VERSION = \"103.0\""));
  assert!(repo.origin_tags()?.is_empty());
  assert!(!repo.path.join(".shipline/runs").exists());
  Ok(())
}
