//! Release operations for SystemGit (commit, tag, push, worktrees)

use super::Identity;
use super::system_git::SystemGit;
use crate::core::error::{GitError, ShipError, ShipResult};
use crate::utils::{is_local_path, path_to_git_format};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;

impl SystemGit {
  /// Stage paths for the next commit
  pub fn stage_paths(&self, paths: &[String]) -> ShipResult<()> {
    let mut args = vec!["add", "--"];
    args.extend(paths.iter().map(String::as_str));
    self.run(&args)?;
    Ok(())
  }

  /// Whether the index differs from HEAD
  pub fn has_staged_changes(&self) -> ShipResult<bool> {
    let args = ["diff", "--cached", "--quiet"];
    let output = self.git_cmd().args(args).output().map_err(ShipError::from)?;
    // --quiet: 0 clean, 1 differences, anything else is a git failure
    match output.status.code() {
      Some(0) => Ok(false),
      Some(1) => Ok(true),
      _ => Err(ShipError::Git(GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      })),
    }
  }

  /// Commit staged changes as `identity`, returning the new HEAD
  pub fn commit(&self, message: &str, identity: &Identity) -> ShipResult<String> {
    let user_name = format!("user.name={}", identity.name);
    let user_email = format!("user.email={}", identity.email);
    self.run(&["-c", &user_name, "-c", &user_email, "commit", "-m", message])?;
    self.head_commit()
  }

  pub fn tag_exists(&self, tag: &str) -> ShipResult<bool> {
    let reference = format!("refs/tags/{}", tag);
    let output = self
      .git_cmd()
      .args(["rev-parse", "--verify", "--quiet", &reference])
      .output()
      .map_err(ShipError::from)?;
    Ok(output.status.success())
  }

  /// Create an annotated tag at HEAD; a tag is created once, never moved
  pub fn create_tag(&self, tag: &str, message: &str, identity: &Identity) -> ShipResult<()> {
    if self.tag_exists(tag)? {
      return Err(GitError::TagExists { tag: tag.to_string() }.into());
    }
    let user_name = format!("user.name={}", identity.name);
    let user_email = format!("user.email={}", identity.email);
    self.run(&["-c", &user_name, "-c", &user_email, "tag", "-a", tag, "-m", message])?;
    Ok(())
  }

  /// Commit SHA a tag points at
  pub fn resolve_tag(&self, tag: &str) -> ShipResult<String> {
    let spec = format!("refs/tags/{}^{{commit}}", tag);
    let output = self
      .git_cmd()
      .args(["rev-parse", "--verify", "--quiet", &spec])
      .output()
      .map_err(ShipError::from)?;

    if !output.status.success() {
      return Err(GitError::TagNotFound { tag: tag.to_string() }.into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Tags pointing at HEAD
  pub fn tags_at_head(&self) -> ShipResult<Vec<String>> {
    let output = self.run(&["tag", "--points-at", "HEAD"])?;
    Ok(
      String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect(),
    )
  }

  /// URL configured for a remote, or the argument itself when it is a URL/path
  pub fn remote_url(&self, remote: &str) -> ShipResult<String> {
    let output = self
      .git_cmd()
      .args(["remote", "get-url", remote])
      .output()
      .map_err(ShipError::from)?;
    if output.status.success() {
      Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
      Ok(remote.to_string())
    }
  }

  /// Push refs to a remote
  ///
  /// A token is sent as an HTTP basic auth header through `GIT_CONFIG_*`
  /// variables so it never appears in the process arguments. Local remotes
  /// ignore the token.
  pub fn push(&self, remote: &str, refs: &[String], token: Option<&str>) -> ShipResult<()> {
    let url = self.remote_url(remote)?;
    let mut cmd = self.git_cmd();

    if let Some(token) = token
      && !is_local_path(&url)
    {
      let credentials = STANDARD.encode(format!("x-access-token:{}", token));
      cmd.env("GIT_CONFIG_COUNT", "1");
      cmd.env("GIT_CONFIG_KEY_0", "http.extraheader");
      cmd.env("GIT_CONFIG_VALUE_0", format!("AUTHORIZATION: basic {}", credentials));
    }

    let mut args = vec!["push", remote];
    args.extend(refs.iter().map(String::as_str));

    match self.run_cmd(cmd, &args) {
      Ok(_) => {
        tracing::info!(remote, refs = ?refs, "pushed");
        Ok(())
      }
      Err(ShipError::Git(GitError::CommandFailed { stderr, .. })) => Err(
        GitError::PushFailed {
          remote: remote.to_string(),
          reason: stderr,
        }
        .into(),
      ),
      Err(e) => Err(e),
    }
  }

  /// Add a detached worktree at `commit`
  pub fn add_worktree(&self, path: &Path, commit: &str) -> ShipResult<()> {
    let path = path_to_git_format(path);
    self.run(&["worktree", "add", "--detach", "--force", &path, commit])?;
    Ok(())
  }

  /// Remove a worktree, discarding any build output inside it
  pub fn remove_worktree(&self, path: &Path) -> ShipResult<()> {
    let path = path_to_git_format(path);
    self.run(&["worktree", "remove", "--force", &path])?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;
  use std::process::Command;
  use tempfile::TempDir;

  fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").current_dir(dir).args(args).status().unwrap();
    assert!(status.success(), "git {:?} failed", args);
  }

  fn init_repo() -> TempDir {
    let tmp = TempDir::new().unwrap();
    git(tmp.path(), &["init", "--initial-branch=main"]);
    std::fs::write(tmp.path().join("setup.py"), "VERSION = \"1.0\"\n").unwrap();
    git(tmp.path(), &["add", "."]);
    git(
      tmp.path(),
      &["-c", "user.name=Test", "-c", "user.email=test@example.com", "commit", "-m", "init"],
    );
    tmp
  }

  #[test]
  fn test_has_staged_changes() {
    let tmp = init_repo();
    let repo = SystemGit::open(tmp.path()).unwrap();
    assert!(!repo.has_staged_changes().unwrap());

    std::fs::write(tmp.path().join("setup.py"), "VERSION = \"2.0\"\n").unwrap();
    repo.stage_paths(&["setup.py".to_string()]).unwrap();
    assert!(repo.has_staged_changes().unwrap());
  }

  #[test]
  fn test_has_staged_changes_reports_git_failure() {
    let tmp = init_repo();
    let repo = SystemGit::open(tmp.path()).unwrap();
    drop(tmp);

    let missing = PathBuf::from(repo.work_tree());
    assert!(!missing.exists());
    match repo.has_staged_changes() {
      Err(ShipError::Git(GitError::CommandFailed { command, .. })) => {
        assert_eq!(command, "git diff --cached --quiet");
      }
      other => panic!("expected a git failure, got {:?}", other.map_err(|e| e.to_string())),
    }
  }
}
