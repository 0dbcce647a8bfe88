use crate::core::error::{ConfigError, ShipError, ShipResult, ResultExt};
use crate::core::params::template_names;
use crate::graph::StageGraph;
use crate::pipeline::matrix::MatrixConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Release pipeline definition
/// Searched in order: shipline.toml, .shipline.toml, .config/shipline.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(default)]
  pub pipeline: PipelineMeta,
  #[serde(default)]
  pub version_files: Vec<VersionFile>,
  #[serde(default)]
  pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMeta {
  #[serde(default = "default_name")]
  pub name: String,

  /// Interpreter looked up in PATH and exported as SHIPLINE_INTERPRETER
  #[serde(default = "default_interpreter")]
  pub interpreter: String,

  /// Documentation host API root; the per-project URL is derived from it
  #[serde(default = "default_docs_api_base")]
  pub docs_api_base: String,

  /// Days an uploaded artifact stays downloadable
  #[serde(default = "default_retention_days")]
  pub artifact_retention_days: u32,
}

fn default_name() -> String {
  "release".to_string()
}

fn default_interpreter() -> String {
  "python3".to_string()
}

fn default_docs_api_base() -> String {
  "https://readthedocs.org/api/v3".to_string()
}

fn default_retention_days() -> u32 {
  3
}

/// Longest retention window a pipeline may ask for
pub const MAX_RETENTION_DAYS: u32 = 3650;

fn validate_retention(days: u32, what: &str) -> ShipResult<()> {
  if days == 0 || days > MAX_RETENTION_DAYS {
    return Err(invalid(format!(
      "{} must be between 1 and {} days, got {}",
      what, MAX_RETENTION_DAYS, days
    )));
  }
  Ok(())
}

fn default_true() -> bool {
  true
}

impl Default for PipelineMeta {
  fn default() -> Self {
    Self {
      name: default_name(),
      interpreter: default_interpreter(),
      docs_api_base: default_docs_api_base(),
      artifact_retention_days: default_retention_days(),
    }
  }
}

/// A file carrying the project version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFile {
  pub path: PathBuf,
  #[serde(default)]
  pub kind: VersionFileKind,
  /// Regex with one capture group around the version (kind = "regex")
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pattern: Option<String>,
  /// Dotted key path, e.g. "project.version" (kind = "toml")
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VersionFileKind {
  #[default]
  Regex,
  Toml,
}

/// A named group of sequential steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
  pub name: String,

  /// Stages that must succeed before this one starts
  #[serde(default)]
  pub needs: Vec<String>,

  /// Ref (usually the release tag) each job checks out into its own worktree
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub checkout: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub matrix: Option<MatrixConfig>,

  /// Cancel sibling matrix jobs after the first failure
  #[serde(default = "default_true")]
  pub fail_fast: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_parallel: Option<usize>,

  #[serde(default)]
  pub env: BTreeMap<String, String>,

  #[serde(default)]
  pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(flatten)]
  pub action: StepAction,
}

/// What a step does
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepAction {
  /// Shell command (`sh -c`)
  Run {
    run: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
    /// Secret names exported to the command's environment
    #[serde(default)]
    secrets: Vec<String>,
  },

  /// Write the run version into every `[[version_files]]` entry
  BumpVersion,

  /// Commit as the developer identity
  Commit {
    #[serde(default = "default_commit_message")]
    message: String,
    /// Paths to stage; defaults to the version files
    #[serde(default)]
    paths: Vec<String>,
  },

  /// Annotated tag at HEAD
  Tag {
    #[serde(default = "default_tag")]
    tag: String,
    #[serde(default = "default_tag_message")]
    message: String,
  },

  /// Push HEAD (and the run tag) to a remote
  Push {
    #[serde(default = "default_remote")]
    remote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_secret: Option<String>,
    #[serde(default = "default_true")]
    tags: bool,
  },

  UploadArtifact {
    artifact: String,
    /// Glob relative to the job directory
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retention_days: Option<u32>,
  },

  DownloadArtifact {
    artifact: String,
    #[serde(default = "default_into")]
    into: String,
  },
}

fn default_commit_message() -> String {
  "Release {{ version }}".to_string()
}

fn default_tag() -> String {
  "{{ version }}".to_string()
}

fn default_tag_message() -> String {
  "Release {{ version }}".to_string()
}

fn default_remote() -> String {
  "origin".to_string()
}

fn default_into() -> String {
  "dist".to_string()
}

/// Default pipeline written by `shipline init`
pub const DEFAULT_PIPELINE: &str = r#"# Release pipeline for shipline
#
# Run with:
#   shipline run --version 104.0 --developer-name "Jane Doe" \
#     --developer-email jane@example.com --docs-project avocado-framework

[pipeline]
name = "release"
interpreter = "python3"
docs_api_base = "https://readthedocs.org/api/v3"
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
message = "Release {{ version }}"

[[stages.steps]]
type = "tag"
tag = "{{ version }}"

[[stages.steps]]
type = "push"
remote = "origin"
token_secret = "RELEASE_TOKEN"

[[stages.steps]]
name = "Build source distribution"
type = "run"
run = "{{ interpreter }} -m build --sdist --outdir dist"

[[stages.steps]]
type = "upload-artifact"
artifact = "sdist"
path = "dist/*.tar.gz"

[[stages.steps]]
name = "Trigger documentation build"
type = "run"
run = 'curl -fsS -X POST -H "Authorization: Token $RTD_TOKEN" "$SHIPLINE_DOCS_API"versions/latest/builds/'
secrets = ["RTD_TOKEN"]

[[stages]]
name = "publish"
needs = ["release"]

[[stages.steps]]
type = "download-artifact"
artifact = "sdist"
into = "dist"

[[stages.steps]]
name = "Upload to package index"
type = "run"
run = "{{ interpreter }} -m twine upload --non-interactive -u __token__ -p \"$PYPI_API_TOKEN\" dist/*"
secrets = ["PYPI_API_TOKEN"]

[[stages]]
name = "wheels"
needs = ["release"]
checkout = "{{ version }}"
fail_fast = false

[stages.matrix]
python = ["3.9", "3.10", "3.11", "3.12", "3.13"]

[[stages.steps]]
name = "Build wheel"
type = "run"
run = "python{{ matrix.python }} -m build --wheel --outdir dist"

[[stages.steps]]
type = "upload-artifact"
artifact = "wheel-py{{ matrix.python }}"
path = "dist/*.whl"

[[stages.steps]]
name = "Attach wheel to release"
type = "run"
run = "gh release upload {{ version }} dist/*.whl --clobber"
secrets = ["GH_TOKEN"]
"#;

impl PipelineConfig {
  /// Find config file in search order: shipline.toml, .shipline.toml, .config/shipline.toml
  pub fn find_config_path(root: &Path) -> Option<PathBuf> {
    let candidates = [
      root.join("shipline.toml"),
      root.join(".shipline.toml"),
      root.join(".config").join("shipline.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load and validate the pipeline, from `explicit` or the search path
  pub fn load(root: &Path, explicit: Option<&Path>) -> ShipResult<Self> {
    let config_path = match explicit {
      Some(path) => path.to_path_buf(),
      None => Self::find_config_path(root).ok_or_else(|| {
        ShipError::Config(ConfigError::NotFound {
          root: root.to_path_buf(),
        })
      })?,
    };

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read pipeline from {}", config_path.display()))?;
    let config = Self::parse(&content).with_context(|| format!("Invalid pipeline in {}", config_path.display()))?;

    tracing::debug!(path = %config_path.display(), stages = config.stages.len(), "loaded pipeline");
    Ok(config)
  }

  /// Parse and validate a pipeline from TOML text
  pub fn parse(content: &str) -> ShipResult<Self> {
    let config: PipelineConfig = toml_edit::de::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// The default three-stage release pipeline
  pub fn default_release_pipeline() -> ShipResult<Self> {
    Self::parse(DEFAULT_PIPELINE)
  }

  pub fn stage(&self, name: &str) -> Option<&StageConfig> {
    self.stages.iter().find(|s| s.name == name)
  }

  /// Every secret name referenced by any step
  pub fn secret_names(&self) -> BTreeSet<&str> {
    let mut names = BTreeSet::new();
    for stage in &self.stages {
      for step in &stage.steps {
        match &step.action {
          StepAction::Run { secrets, .. } => names.extend(secrets.iter().map(String::as_str)),
          StepAction::Push {
            token_secret: Some(secret),
            ..
          } => {
            names.insert(secret.as_str());
          }
          _ => {}
        }
      }
    }
    names
  }

  /// Validate the pipeline shape
  pub fn validate(&self) -> ShipResult<()> {
    if self.stages.is_empty() {
      return Err(invalid("pipeline has no stages"));
    }
    validate_retention(self.pipeline.artifact_retention_days, "artifact_retention_days")?;

    let mut seen = BTreeSet::new();
    for stage in &self.stages {
      if stage.name.trim().is_empty() {
        return Err(invalid("stage name must not be empty"));
      }
      if !seen.insert(stage.name.as_str()) {
        return Err(invalid(format!("duplicate stage name '{}'", stage.name)));
      }
      if stage.steps.is_empty() {
        return Err(invalid(format!("stage '{}' has no steps", stage.name)));
      }
      if stage.max_parallel == Some(0) {
        return Err(invalid(format!("stage '{}': max_parallel must be at least 1", stage.name)));
      }
      if let Some(matrix) = &stage.matrix {
        matrix
          .validate()
          .map_err(|reason| invalid(format!("stage '{}': {}", stage.name, reason)))?;
      }

      for step in &stage.steps {
        let StepAction::UploadArtifact {
          artifact,
          retention_days,
          ..
        } = &step.action
        else {
          continue;
        };
        if let Some(days) = retention_days {
          validate_retention(*days, &format!("stage '{}': retention_days for '{}'", stage.name, artifact))?;
        }
        // Matrix jobs share the store, so each job needs its own artifact name
        if stage.matrix.is_some() && !template_names(artifact).any(|name| name.starts_with("matrix.")) {
          return Err(invalid(format!(
            "stage '{}' is a matrix stage; artifact '{}' must include a {{{{ matrix.<axis> }}}} placeholder",
            stage.name, artifact
          )));
        }
      }
    }

    for file in &self.version_files {
      file.validate()?;
    }

    let uses_bump = self
      .stages
      .iter()
      .flat_map(|s| &s.steps)
      .any(|step| step.action == StepAction::BumpVersion);
    if uses_bump && self.version_files.is_empty() {
      return Err(invalid("a bump-version step needs at least one [[version_files]] entry"));
    }

    // Needs resolution and cycle detection
    let graph = StageGraph::build(&self.stages)?;
    graph.topological_order()?;

    self.validate_artifact_flow(&graph)
  }

  /// Every download must be satisfied by an upload in the same stage or an ancestor
  fn validate_artifact_flow(&self, graph: &StageGraph) -> ShipResult<()> {
    for stage in &self.stages {
      let ancestors = graph.ancestors(&stage.name);
      let mut uploaded_here = BTreeSet::new();

      for step in &stage.steps {
        match &step.action {
          StepAction::UploadArtifact { artifact, .. } => {
            uploaded_here.insert(artifact.as_str());
          }
          StepAction::DownloadArtifact { artifact, .. } => {
            let upstream = self
              .stages
              .iter()
              .filter(|s| ancestors.contains(&s.name))
              .flat_map(|s| &s.steps)
              .any(|s| matches!(&s.action, StepAction::UploadArtifact { artifact: a, .. } if a == artifact));

            if !upstream && !uploaded_here.contains(artifact.as_str()) {
              return Err(invalid(format!(
                "stage '{}' downloads artifact '{}' but no stage it needs uploads it",
                stage.name, artifact
              )));
            }
          }
          _ => {}
        }
      }
    }
    Ok(())
  }
}

impl VersionFile {
  pub fn validate(&self) -> ShipResult<()> {
    match self.kind {
      VersionFileKind::Regex => {
        let pattern = self
          .pattern
          .as_deref()
          .ok_or_else(|| invalid(format!("version file {} needs a pattern", self.path.display())))?;
        let re = regex::Regex::new(pattern)?;
        if re.captures_len() < 2 {
          return Err(invalid(format!(
            "pattern for {} must have a capture group around the version",
            self.path.display()
          )));
        }
      }
      VersionFileKind::Toml => {
        if self.key.as_deref().is_none_or(str::is_empty) {
          return Err(invalid(format!("version file {} needs a key", self.path.display())));
        }
      }
    }
    Ok(())
  }
}

fn invalid(reason: impl Into<String>) -> ShipError {
  ShipError::Config(ConfigError::Invalid { reason: reason.into() })
}
