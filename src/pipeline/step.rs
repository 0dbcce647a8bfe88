//! Execution of a single planned step

use crate::artifacts::ArtifactStore;
use crate::core::error::{ShipError, ShipResult, ResultExt};
use crate::core::plan::{PlannedAction, PlannedStep};
use crate::core::secrets::SecretStore;
use crate::core::vcs::{Identity, SystemGit};
use crate::pipeline::bump::bump_version_file;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

/// Lines of stderr kept in a failed step's error
const STDERR_TAIL_LINES: usize = 20;

/// What a step can see while it runs
pub struct StepEnv<'a> {
  pub run_id: &'a str,
  /// Job working directory (repository root or the job's worktree)
  pub work_dir: &'a Path,
  /// Exported variables (params, matrix values, stage env)
  pub env: &'a BTreeMap<String, String>,
  pub identity: &'a Identity,
  pub secrets: &'a SecretStore,
  pub store: &'a ArtifactStore,
}

impl StepEnv<'_> {
  fn git(&self) -> ShipResult<SystemGit> {
    SystemGit::open(self.work_dir)
  }
}

/// Run one step to completion
pub fn execute(step: &PlannedStep, env: &StepEnv<'_>) -> ShipResult<()> {
  tracing::debug!(step = %step.name, action = %env.secrets.redact(&step.action.describe()), "executing step");

  match &step.action {
    PlannedAction::Run {
      command,
      env: step_env,
      secrets,
    } => run_command(&step.name, command, step_env, secrets, env),

    PlannedAction::BumpVersion { version, files } => {
      for file in files {
        bump_version_file(env.work_dir, file, version)?;
      }
      Ok(())
    }

    PlannedAction::Commit { message, paths } => {
      let git = env.git()?;
      git.stage_paths(paths)?;
      if !git.has_staged_changes()? {
        return Err(ShipError::with_help(
          format!("Nothing to commit for '{}'", message),
          "The version files already contain this version. Pick a new version or drop the commit step.",
        ));
      }
      let sha = git.commit(message, env.identity)?;
      tracing::info!(commit = %sha, "created release commit");
      Ok(())
    }

    PlannedAction::Tag { tag, message } => {
      env.git()?.create_tag(tag, message, env.identity)?;
      tracing::info!(tag = %tag, "created tag");
      Ok(())
    }

    PlannedAction::Push {
      remote,
      token_secret,
      tag,
    } => {
      let token = token_secret.as_deref().map(|name| env.secrets.require(name)).transpose()?;
      let mut refs = vec!["HEAD".to_string()];
      if let Some(tag) = tag {
        refs.push(format!("refs/tags/{}", tag));
      }
      env.git()?.push(remote, &refs, token).map_err(|e| redact_error(e, env.secrets))
    }

    PlannedAction::UploadArtifact {
      artifact,
      path,
      retention_days,
    } => {
      env
        .store
        .upload(env.run_id, artifact, env.work_dir, path, *retention_days, Utc::now())?;
      Ok(())
    }

    PlannedAction::DownloadArtifact { artifact, into } => {
      let dest = env.work_dir.join(into);
      env.store.download(env.run_id, artifact, &dest, Utc::now())?;
      Ok(())
    }
  }
}

/// `sh -c` with the job environment plus the secrets the step declares
///
/// Secrets the step does not declare are removed from the inherited
/// environment.
fn run_command(
  name: &str,
  command: &str,
  step_env: &BTreeMap<String, String>,
  declared: &[String],
  env: &StepEnv<'_>,
) -> ShipResult<()> {
  let mut cmd = Command::new("sh");
  cmd.arg("-c").arg(command).current_dir(env.work_dir);
  cmd.envs(env.env).envs(step_env);

  for secret in env.secrets.names() {
    if !declared.iter().any(|d| d == secret) {
      cmd.env_remove(secret);
    }
  }
  for secret in declared {
    cmd.env(secret, env.secrets.require(secret)?);
  }

  let output = cmd
    .output()
    .with_context(|| format!("Failed to start step '{}'", name))?;

  let stdout = env.secrets.redact(&String::from_utf8_lossy(&output.stdout));
  for line in stdout.lines() {
    tracing::debug!(step = name, "{}", line);
  }

  if !output.status.success() {
    let stderr = env.secrets.redact(&String::from_utf8_lossy(&output.stderr));
    return Err(ShipError::Step {
      step: name.to_string(),
      code: output.status.code(),
      stderr: tail(&stderr, STDERR_TAIL_LINES),
    });
  }
  Ok(())
}

fn tail(text: &str, lines: usize) -> String {
  let all: Vec<&str> = text.lines().collect();
  all[all.len().saturating_sub(lines)..].join("\n")
}

fn redact_error(error: ShipError, secrets: &SecretStore) -> ShipError {
  ShipError::message(secrets.redact(&error.to_string()))
}
