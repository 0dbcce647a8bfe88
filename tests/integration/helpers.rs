//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const SETUP_PY: &str = "from setuptools import setup\n\nVERSION = \"103.0\"\n\nsetup(name=\"avocado-framework\", version=VERSION)\n";
pub const SPEC_FILE: &str = "Name: python-avocado\nVersion: 103.0\nRelease: 1%{?dist}\n";

/// A project repository with a bare `origin` next to it
///
/// ```text
/// <tmp>/repo        working repository (main branch, one commit)
/// <tmp>/origin.git  bare remote
/// ```
pub struct TestRepo {
  root: TempDir,
  pub path: PathBuf,
}

impl TestRepo {
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().join("repo");
    std::fs::create_dir_all(&path)?;

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;

    std::fs::write(path.join("setup.py"), SETUP_PY)?;
    std::fs::write(path.join("python-avocado.spec"), SPEC_FILE)?;
    std::fs::write(path.join(".gitignore"), ".shipline/\ndist/\nincoming/\n")?;
    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "Initial commit"])?;

    let origin = root.path().join("origin.git");
    git(root.path(), &["init", "--bare", "--initial-branch=main", "origin.git"])?;
    git(&path, &["remote", "add", "origin", &origin.to_string_lossy()])?;
    git(&path, &["push", "-u", "origin", "main"])?;

    Ok(Self { root, path })
  }

  /// Directory containing the repository (outside the work tree)
  pub fn outside(&self) -> &Path {
    self.root.path()
  }

  pub fn origin(&self) -> PathBuf {
    self.root.path().join("origin.git")
  }

  pub fn write_pipeline(&self, content: &str) -> Result<()> {
    std::fs::write(self.path.join("shipline.toml"), content)?;
    Ok(())
  }

  pub fn read_file(&self, path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(self.path.join(path))?)
  }

  /// Tags in the bare origin
  pub fn origin_tags(&self) -> Result<Vec<String>> {
    let output = git(&self.origin(), &["tag", "--list"])?;
    Ok(String::from_utf8_lossy(&output.stdout).lines().map(String::from).collect())
  }

  /// Subject of a commit in the bare origin
  pub fn origin_subject(&self, rev: &str) -> Result<String> {
    let output = git(&self.origin(), &["log", "-1", "--format=%s", rev])?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Release parameters as CLI flags
pub fn params(version: &str) -> Vec<String> {
  vec![
    "--version".to_string(),
    version.to_string(),
    "--developer-name".to_string(),
    "Release Bot".to_string(),
    "--developer-email".to_string(),
    "release@example.com".to_string(),
    "--docs-project".to_string(),
    "avocado-framework".to_string(),
  ]
}

/// Run the shipline binary, returning the output whatever the exit status
pub fn run_shipline_raw(cwd: &Path, args: &[&str], env: &[(&str, &str)]) -> Result<Output> {
  let shipline_bin = env!("CARGO_BIN_EXE_shipline");

  let mut cmd = Command::new(shipline_bin);
  cmd.current_dir(cwd).args(args);
  for var in [
    "SHIPLINE_CONFIG",
    "SHIPLINE_VERSION",
    "SHIPLINE_DEVELOPER_NAME",
    "SHIPLINE_DEVELOPER_EMAIL",
    "SHIPLINE_DOCS_PROJECT",
    "SHIPLINE_LOG",
    "RELEASE_TOKEN",
  ] {
    cmd.env_remove(var);
  }
  cmd.envs(env.iter().copied());

  cmd.output().context("Failed to run shipline")
}

/// Run the shipline binary and fail on a non-zero exit
pub fn run_shipline(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_shipline_raw(cwd, args, &[])?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "shipline command failed: shipline {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}

/// Parse stdout as JSON
pub fn stdout_json(output: &Output) -> Result<serde_json::Value> {
  serde_json::from_slice(&output.stdout).context("stdout is not JSON")
}

/// `args` followed by the release parameters
pub fn with_params<'a>(args: &[&'a str], params: &'a [String]) -> Vec<&'a str> {
  let mut all: Vec<&str> = args.to_vec();
  all.extend(params.iter().map(String::as_str));
  all
}
