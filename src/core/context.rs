//! Run context - build once, pass everywhere
//!
//! # Architecture
//!
//! ```text
//! main.rs:
//!   RunContext::build() -> &RunContext
//!   |
//!   v
//! commands/validate.rs, plan.rs, run.rs, artifacts.rs:
//!   fn run_*(ctx: &RunContext, ...)
//! ```
//!
//! The context owns the repository-level state that does not depend on run
//! parameters: the repository root, the pipeline, the secrets it references
//! and the artifact store.

use crate::artifacts::ArtifactStore;
use crate::core::config::PipelineConfig;
use crate::core::error::ShipResult;
use crate::core::secrets::SecretStore;
use crate::core::vcs::SystemGit;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory under the repository root holding all run state
pub const STATE_DIR: &str = ".shipline";

/// Shared state for one invocation.
///
/// Uses Arc so runner threads can hold the pipeline and secrets without clones.
#[derive(Clone)]
pub struct RunContext {
  /// Repository root (absolute path)
  pub root: PathBuf,

  /// Validated pipeline definition
  pub config: Arc<PipelineConfig>,

  /// Secrets named by the pipeline, read from the environment
  pub secrets: Arc<SecretStore>,

  /// Artifact store under `.shipline/artifacts`
  pub store: Arc<ArtifactStore>,
}

impl RunContext {
  /// Build the context for the repository containing `start`.
  ///
  /// Outside a git repository `start` itself is used as the root, so
  /// `validate` and `plan` work on a bare checkout of the pipeline file.
  pub fn build(start: &Path, config_path: Option<&Path>) -> ShipResult<Self> {
    let root = find_root(start);
    let config = PipelineConfig::load(&root, config_path)?;
    let secrets = SecretStore::from_env(config.secret_names());
    tracing::debug!(root = %root.display(), secrets = ?secrets, "built run context");
    Ok(Self::from_parts(root, config, secrets))
  }

  pub fn from_parts(root: PathBuf, config: PipelineConfig, secrets: SecretStore) -> Self {
    let store = ArtifactStore::for_repo(&root);
    Self {
      root,
      config: Arc::new(config),
      secrets: Arc::new(secrets),
      store: Arc::new(store),
    }
  }

  pub fn state_dir(&self) -> PathBuf {
    self.root.join(STATE_DIR)
  }

  /// Per-run scratch space for job worktrees
  pub fn work_dir(&self, run_id: &str) -> PathBuf {
    self.state_dir().join("work").join(run_id)
  }

  /// Where run reports are written
  pub fn runs_dir(&self) -> PathBuf {
    self.state_dir().join("runs")
  }
}

/// Repository top level for `start`, or `start` when it is not in a repository
pub fn find_root(start: &Path) -> PathBuf {
  match SystemGit::open(start) {
    Ok(git) => git.work_tree().to_path_buf(),
    Err(e) => {
      tracing::debug!(error = %e, "not inside a git repository");
      start.to_path_buf()
    }
  }
}
