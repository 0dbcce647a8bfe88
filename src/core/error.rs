//! Error types for shipline with contextual messages and exit codes
//!
//! Every error is categorized so the CLI can pick an exit code, and most
//! categories carry a help message pointing the operator at a fix.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for shipline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid params, missing files)
  User = 1,
  /// System error (git, I/O)
  System = 2,
  /// Validation failure (pipeline definition, artifact integrity)
  Validation = 3,
  /// The pipeline ran but at least one stage did not succeed
  Pipeline = 4,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for shipline
#[derive(Debug)]
pub enum ShipError {
  /// Configuration errors
  Config(ConfigError),

  /// Git operation errors
  Git(GitError),

  /// Validation errors (parameters, pipeline shape)
  Validation(ValidationError),

  /// Artifact store errors
  Artifact(ArtifactError),

  /// Missing or rejected credentials
  Auth { secret: String, reason: String },

  /// A step command exited unsuccessfully
  Step {
    step: String,
    code: Option<i32>,
    stderr: String,
  },

  /// Run finished with failed or skipped stages
  PipelineFailed { failed: Vec<String> },

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl ShipError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    ShipError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    ShipError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      ShipError::Message { message, context, help } => ShipError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      ShipError::Io(e) => ShipError::Message {
        message: ctx_str,
        context: Some(e.to_string()),
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      ShipError::Config(_) => ExitCode::User,
      ShipError::Git(_) => ExitCode::System,
      ShipError::Validation(_) => ExitCode::Validation,
      ShipError::Artifact(ArtifactError::Corrupt { .. }) => ExitCode::Validation,
      ShipError::Artifact(_) => ExitCode::User,
      ShipError::Auth { .. } => ExitCode::User,
      ShipError::Step { .. } => ExitCode::System,
      ShipError::PipelineFailed { .. } => ExitCode::Pipeline,
      ShipError::Io(_) => ExitCode::System,
      ShipError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      ShipError::Config(e) => e.help_message(),
      ShipError::Git(e) => e.help_message(),
      ShipError::Validation(e) => e.help_message(),
      ShipError::Artifact(e) => e.help_message(),
      ShipError::Auth { secret, .. } => Some(format!(
        "Export {} in the environment before starting the run.",
        secret
      )),
      ShipError::PipelineFailed { .. } => {
        Some("The full run report is stored under .shipline/runs/.".to_string())
      }
      ShipError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl fmt::Display for ShipError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ShipError::Config(e) => write!(f, "{}", e),
      ShipError::Git(e) => write!(f, "{}", e),
      ShipError::Validation(e) => write!(f, "{}", e),
      ShipError::Artifact(e) => write!(f, "{}", e),
      ShipError::Auth { secret, reason } => {
        write!(f, "Authentication failed ({}): {}", secret, reason)
      }
      ShipError::Step { step, code, stderr } => {
        match code {
          Some(code) => write!(f, "Step '{}' exited with code {}", step, code)?,
          None => write!(f, "Step '{}' was terminated by a signal", step)?,
        }
        let stderr = stderr.trim();
        if !stderr.is_empty() {
          write!(f, "\n{}", stderr)?;
        }
        Ok(())
      }
      ShipError::PipelineFailed { failed } => {
        write!(f, "Pipeline did not succeed: {}", failed.join(", "))
      }
      ShipError::Io(e) => write!(f, "I/O error: {}", e),
      ShipError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for ShipError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ShipError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for ShipError {
  fn from(err: io::Error) -> Self {
    ShipError::Io(err)
  }
}

impl From<String> for ShipError {
  fn from(msg: String) -> Self {
    ShipError::message(msg)
  }
}

impl From<&str> for ShipError {
  fn from(msg: &str) -> Self {
    ShipError::message(msg)
  }
}

impl From<toml_edit::TomlError> for ShipError {
  fn from(err: toml_edit::TomlError) -> Self {
    ShipError::message(format!("TOML parse error: {}", err))
  }
}

impl From<toml_edit::de::Error> for ShipError {
  fn from(err: toml_edit::de::Error) -> Self {
    ShipError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for ShipError {
  fn from(err: serde_json::Error) -> Self {
    ShipError::message(format!("JSON error: {}", err))
  }
}

impl From<regex::Error> for ShipError {
  fn from(err: regex::Error) -> Self {
    ShipError::message(format!("Invalid pattern: {}", err))
  }
}

impl From<glob::PatternError> for ShipError {
  fn from(err: glob::PatternError) -> Self {
    ShipError::message(format!("Invalid glob pattern: {}", err))
  }
}

impl From<glob::GlobError> for ShipError {
  fn from(err: glob::GlobError) -> Self {
    ShipError::message(format!("Glob error: {}", err))
  }
}

impl From<rayon::ThreadPoolBuildError> for ShipError {
  fn from(err: rayon::ThreadPoolBuildError) -> Self {
    ShipError::message(format!("Failed to build worker pool: {}", err))
  }
}

impl From<ConfigError> for ShipError {
  fn from(err: ConfigError) -> Self {
    ShipError::Config(err)
  }
}

impl From<GitError> for ShipError {
  fn from(err: GitError) -> Self {
    ShipError::Git(err)
  }
}

impl From<ValidationError> for ShipError {
  fn from(err: ValidationError) -> Self {
    ShipError::Validation(err)
  }
}

impl From<ArtifactError> for ShipError {
  fn from(err: ArtifactError) -> Self {
    ShipError::Artifact(err)
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// shipline.toml not found
  NotFound { root: PathBuf },

  /// Pipeline definition is structurally invalid
  Invalid { reason: String },

  /// Stage graph contains a cycle
  Cycle { stages: Vec<String> },

  /// A referenced stage does not exist
  UnknownStage { stage: String, referenced_by: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => {
        Some("Run `shipline init` to create a default release pipeline.".to_string())
      }
      ConfigError::Cycle { .. } => Some("Remove one of the `needs` entries to break the cycle.".to_string()),
      ConfigError::UnknownStage { .. } => {
        Some("Check the spelling of `needs` entries against the stage names.".to_string())
      }
      ConfigError::Invalid { .. } => Some("Run `shipline validate` after editing shipline.toml.".to_string()),
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::NotFound { root } => {
        write!(
          f,
          "No shipline pipeline found.\nExpected file: {}/shipline.toml",
          root.display()
        )
      }
      ConfigError::Invalid { reason } => write!(f, "Invalid pipeline: {}", reason),
      ConfigError::Cycle { stages } => {
        write!(f, "Stage dependency cycle: {}", stages.join(" → "))
      }
      ConfigError::UnknownStage { stage, referenced_by } => {
        write!(f, "Stage '{}' needs unknown stage '{}'", referenced_by, stage)
      }
    }
  }
}

/// Git operation errors
#[derive(Debug)]
pub enum GitError {
  /// Git command failed
  CommandFailed { command: String, stderr: String },

  /// Repository not found
  RepoNotFound { path: PathBuf },

  /// Tag already exists (tags are created once per run)
  TagExists { tag: String },

  /// Tag not found
  TagNotFound { tag: String },

  /// Worktree HEAD does not match the requested tag
  CheckoutMismatch { expected: String, found: String },

  /// Push failed
  PushFailed { remote: String, reason: String },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::PushFailed { reason, .. } => {
        if reason.contains("non-fast-forward") {
          Some("The remote has commits you don't have. Pull and start a new run.".to_string())
        } else if reason.contains("403") || reason.contains("denied") || reason.contains("Authentication") {
          Some("Check that the push token secret is exported and has write access.".to_string())
        } else {
          None
        }
      }
      GitError::RepoNotFound { path } => Some(format!(
        "Run shipline from inside a git repository (looked at {}).",
        path.display()
      )),
      GitError::TagExists { tag } => Some(format!(
        "Pick a new version, or delete the tag with `git tag -d {}` if it was created by a failed run.",
        tag
      )),
      _ => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr)
      }
      GitError::RepoNotFound { path } => {
        write!(f, "Git repository not found at: {}", path.display())
      }
      GitError::TagExists { tag } => write!(f, "Tag already exists: {}", tag),
      GitError::TagNotFound { tag } => write!(f, "Tag not found: {}", tag),
      GitError::CheckoutMismatch { expected, found } => {
        write!(f, "Checked out '{}' but expected tag '{}'", found, expected)
      }
      GitError::PushFailed { remote, reason } => {
        write!(f, "Push to {} failed: {}", remote, reason)
      }
    }
  }
}

/// Validation errors
#[derive(Debug)]
pub enum ValidationError {
  /// A run parameter is malformed
  InvalidParam { name: String, reason: String },

  /// A template references an unknown variable
  UnknownVariable { name: String, template: String },
}

impl ValidationError {
  fn help_message(&self) -> Option<String> {
    match self {
      ValidationError::InvalidParam { name, .. } => {
        Some(format!("Pass a valid --{} (or the matching SHIPLINE_* variable).", name.replace('_', "-")))
      }
      ValidationError::UnknownVariable { .. } => Some(
        "Available variables: version, developer_name, developer_email, docs_project, interpreter, docs_api, matrix.<axis>"
          .to_string(),
      ),
    }
  }
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValidationError::InvalidParam { name, reason } => {
        write!(f, "Invalid parameter '{}': {}", name, reason)
      }
      ValidationError::UnknownVariable { name, template } => {
        write!(f, "Unknown variable '{}' in '{}'", name, template)
      }
    }
  }
}

/// Artifact store errors
#[derive(Debug)]
pub enum ArtifactError {
  /// No artifact with this name in the run
  NotFound { name: String, run_id: String },

  /// Artifact exists but its retention window has passed
  Expired { name: String, expired_at: String },

  /// Same name uploaded twice in one run
  AlreadyExists { name: String },

  /// Upload path matched no files
  NoFiles { name: String, pattern: String },

  /// Checksum mismatch on download
  Corrupt { name: String, file: String },
}

impl ArtifactError {
  fn help_message(&self) -> Option<String> {
    match self {
      ArtifactError::NotFound { .. } => {
        Some("Make sure the producing stage is listed in `needs` and uploads the artifact.".to_string())
      }
      ArtifactError::Expired { .. } => Some("Start a new run to rebuild the artifact.".to_string()),
      ArtifactError::NoFiles { .. } => Some("Check that the build step writes to the upload path.".to_string()),
      _ => None,
    }
  }
}

impl fmt::Display for ArtifactError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArtifactError::NotFound { name, run_id } => {
        write!(f, "Artifact '{}' not found in run {}", name, run_id)
      }
      ArtifactError::Expired { name, expired_at } => {
        write!(f, "Artifact '{}' expired at {}", name, expired_at)
      }
      ArtifactError::AlreadyExists { name } => write!(f, "Artifact '{}' was already uploaded", name),
      ArtifactError::NoFiles { name, pattern } => {
        write!(f, "Artifact '{}': no files match '{}'", name, pattern)
      }
      ArtifactError::Corrupt { name, file } => {
        write!(f, "Artifact '{}': checksum mismatch for {}", name, file)
      }
    }
  }
}

/// Result type alias for shipline
pub type ShipResult<T> = Result<T, ShipError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> ShipResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> ShipResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<ShipError>,
{
  fn context(self, ctx: impl Into<String>) -> ShipResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> ShipResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &ShipError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exit_codes() {
    assert_eq!(ShipError::message("x").exit_code(), ExitCode::User);
    assert_eq!(
      ShipError::PipelineFailed {
        failed: vec!["wheels".to_string()]
      }
      .exit_code()
      .as_i32(),
      4
    );
    let corrupt = ShipError::Artifact(ArtifactError::Corrupt {
      name: "sdist".to_string(),
      file: "a.tar.gz".to_string(),
    });
    assert_eq!(corrupt.exit_code(), ExitCode::Validation);
  }

  #[test]
  fn test_context_chains() {
    let err = ShipError::message("outer").context("first").context("second");
    assert_eq!(err.to_string(), "outer\nsecond\nfirst");
  }

  #[test]
  fn test_io_context_becomes_message() {
    let io = io::Error::new(io::ErrorKind::NotFound, "gone");
    let err: ShipResult<()> = Err(io).context("Failed to read setup.py");
    let msg = err.unwrap_err().to_string();
    assert!(msg.starts_with("Failed to read setup.py"));
    assert!(msg.contains("gone"));
  }

  #[test]
  fn test_step_display_includes_stderr() {
    let err = ShipError::Step {
      step: "build".to_string(),
      code: Some(2),
      stderr: "boom\n".to_string(),
    };
    assert_eq!(err.to_string(), "Step 'build' exited with code 2\nboom");
  }
}
