//! Run plans: the pipeline with every template resolved
//!
//! A run never executes configuration directly. It first builds a `RunPlan`,
//! which enables:
//!
//! - **Dry-run mode**: show exactly what will run without running it
//! - **Early failure**: unknown variables and bad params fail before any step
//! - **Auditability**: plans are JSON-serializable and identified by a hash
//!
//! ```text
//! shipline.toml + RunParams
//!   ↓
//! RunPlan (stages in execution order, jobs expanded, templates resolved)
//!   ↓
//! PipelineRunner
//!   ↓
//! RunReport
//! ```

use crate::core::config::{PipelineConfig, StageConfig, StepAction, VersionFile};
use crate::core::error::ShipResult;
use crate::core::params::{DerivedValues, RunParams, Vars};
use crate::graph::StageGraph;
use crate::pipeline::matrix::MatrixJob;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Plan identifier (SHA256 hash of plan contents)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanId(String);

impl PlanId {
  /// Create a plan ID from plan contents
  pub fn from_contents(contents: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let result = hasher.finalize();
    Self(format!("{:x}", result))
  }

  /// Get the short ID (first 12 characters)
  pub fn short(&self) -> &str {
    &self.0[..12.min(self.0.len())]
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for PlanId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.short())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
  pub id: PlanId,
  pub pipeline: String,
  pub params: RunParams,
  pub derived: DerivedValues,
  pub retention_days: u32,
  /// Stages in execution order
  pub stages: Vec<PlannedStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStage {
  pub name: String,
  pub needs: Vec<String>,
  pub fail_fast: bool,
  pub max_parallel: usize,
  pub is_matrix: bool,
  pub jobs: Vec<PlannedJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedJob {
  /// Matrix key, empty for non-matrix stages
  pub key: String,
  pub slug: String,
  pub matrix: BTreeMap<String, String>,
  /// Tag checked out into the job's own worktree
  pub checkout: Option<String>,
  /// Exported environment (params, matrix values, stage env); never secrets
  pub env: BTreeMap<String, String>,
  pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
  pub name: String,
  pub action: PlannedAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PlannedAction {
  Run {
    command: String,
    env: BTreeMap<String, String>,
    secrets: Vec<String>,
  },
  BumpVersion {
    version: String,
    files: Vec<VersionFile>,
  },
  Commit {
    message: String,
    paths: Vec<String>,
  },
  Tag {
    tag: String,
    message: String,
  },
  Push {
    remote: String,
    token_secret: Option<String>,
    /// Tag created earlier in the same job, pushed alongside HEAD
    tag: Option<String>,
  },
  UploadArtifact {
    artifact: String,
    path: String,
    retention_days: u32,
  },
  DownloadArtifact {
    artifact: String,
    into: String,
  },
}

impl PlannedAction {
  /// One-line description for dry-run output
  pub fn describe(&self) -> String {
    match self {
      PlannedAction::Run { command, .. } => format!("$ {}", command.lines().next().unwrap_or("")),
      PlannedAction::BumpVersion { version, files } => format!(
        "set version {} in {}",
        version,
        files.iter().map(|f| f.path.display().to_string()).collect::<Vec<_>>().join(", ")
      ),
      PlannedAction::Commit { message, .. } => format!("commit \"{}\"", message),
      PlannedAction::Tag { tag, .. } => format!("tag {}", tag),
      PlannedAction::Push { remote, tag, .. } => match tag {
        Some(tag) => format!("push HEAD and tag {} to {}", tag, remote),
        None => format!("push HEAD to {}", remote),
      },
      PlannedAction::UploadArtifact { artifact, path, .. } => format!("upload {} as '{}'", path, artifact),
      PlannedAction::DownloadArtifact { artifact, into } => format!("download '{}' into {}", artifact, into),
    }
  }
}

/// Hashed part of the plan (everything except the id itself)
#[derive(Serialize)]
struct PlanContents<'a> {
  pipeline: &'a str,
  params: &'a RunParams,
  derived: &'a DerivedValues,
  retention_days: u32,
  stages: &'a [PlannedStage],
}

impl RunPlan {
  /// Resolve the pipeline for one parameter set
  pub fn build(config: &PipelineConfig, params: &RunParams) -> ShipResult<Self> {
    params.validate()?;

    let derived = params.derive(&config.pipeline);
    let vars = Vars::new(params, &derived);
    let graph = StageGraph::build(&config.stages)?;

    let mut stages = Vec::with_capacity(config.stages.len());
    for name in graph.topological_order()? {
      if let Some(stage) = config.stage(&name) {
        stages.push(plan_stage(config, stage, &vars)?);
      }
    }

    let retention_days = config.pipeline.artifact_retention_days;
    let contents = PlanContents {
      pipeline: &config.pipeline.name,
      params,
      derived: &derived,
      retention_days,
      stages: &stages,
    };
    let id = PlanId::from_contents(&serde_json::to_vec(&contents)?);

    Ok(Self {
      id,
      pipeline: config.pipeline.name.clone(),
      params: params.clone(),
      derived,
      retention_days,
      stages,
    })
  }

  #[cfg(test)]
  pub fn stage(&self, name: &str) -> Option<&PlannedStage> {
    self.stages.iter().find(|s| s.name == name)
  }

  pub fn job_count(&self) -> usize {
    self.stages.iter().map(|s| s.jobs.len()).sum()
  }
}

fn plan_stage(config: &PipelineConfig, stage: &StageConfig, vars: &Vars) -> ShipResult<PlannedStage> {
  let matrix_jobs = match &stage.matrix {
    Some(matrix) => matrix.expand(),
    None => vec![MatrixJob::single()],
  };

  let mut jobs = Vec::with_capacity(matrix_jobs.len());
  for matrix_job in &matrix_jobs {
    let job_vars = vars.with_matrix(&matrix_job.values);

    let checkout = stage.checkout.as_deref().map(|r| job_vars.render(r)).transpose()?;

    let mut env = job_vars.env();
    for (key, value) in &stage.env {
      env.insert(key.clone(), job_vars.render(value)?);
    }

    let mut steps = Vec::with_capacity(stage.steps.len());
    let mut created_tag: Option<String> = None;
    for step in &stage.steps {
      let action = plan_action(config, &step.action, &job_vars, &mut created_tag)?;
      let name = match &step.name {
        Some(name) => job_vars.render(name)?,
        None => default_step_name(&action),
      };
      steps.push(PlannedStep { name, action });
    }

    jobs.push(PlannedJob {
      key: matrix_job.key.clone(),
      slug: matrix_job.slug(),
      matrix: matrix_job.values.clone(),
      checkout,
      env,
      steps,
    });
  }

  Ok(PlannedStage {
    name: stage.name.clone(),
    needs: stage.needs.clone(),
    fail_fast: stage.fail_fast,
    max_parallel: stage.max_parallel.unwrap_or(jobs.len()).max(1),
    is_matrix: stage.matrix.is_some(),
    jobs,
  })
}

fn plan_action(
  config: &PipelineConfig,
  action: &StepAction,
  vars: &Vars,
  created_tag: &mut Option<String>,
) -> ShipResult<PlannedAction> {
  Ok(match action {
    StepAction::Run { run, env, secrets } => {
      let mut resolved = BTreeMap::new();
      for (key, value) in env {
        resolved.insert(key.clone(), vars.render(value)?);
      }
      PlannedAction::Run {
        command: vars.render(run)?,
        env: resolved,
        secrets: secrets.clone(),
      }
    }
    StepAction::BumpVersion => PlannedAction::BumpVersion {
      version: vars.render("{{ version }}")?,
      files: config.version_files.clone(),
    },
    StepAction::Commit { message, paths } => {
      let paths = if paths.is_empty() {
        config
          .version_files
          .iter()
          .map(|f| crate::utils::path_to_git_format(&f.path))
          .collect()
      } else {
        paths.iter().map(|p| vars.render(p)).collect::<ShipResult<Vec<_>>>()?
      };
      PlannedAction::Commit {
        message: vars.render(message)?,
        paths,
      }
    }
    StepAction::Tag { tag, message } => {
      let tag = vars.render(tag)?;
      *created_tag = Some(tag.clone());
      PlannedAction::Tag {
        tag,
        message: vars.render(message)?,
      }
    }
    StepAction::Push {
      remote,
      token_secret,
      tags,
    } => PlannedAction::Push {
      remote: vars.render(remote)?,
      token_secret: token_secret.clone(),
      tag: if *tags { created_tag.clone() } else { None },
    },
    StepAction::UploadArtifact {
      artifact,
      path,
      retention_days,
    } => PlannedAction::UploadArtifact {
      artifact: vars.render(artifact)?,
      path: vars.render(path)?,
      retention_days: retention_days.unwrap_or(config.pipeline.artifact_retention_days),
    },
    StepAction::DownloadArtifact { artifact, into } => PlannedAction::DownloadArtifact {
      artifact: vars.render(artifact)?,
      into: vars.render(into)?,
    },
  })
}

fn default_step_name(action: &PlannedAction) -> String {
  match action {
    PlannedAction::Run { command, .. } => {
      let first = command.lines().next().unwrap_or("").trim();
      let mut name: String = first.chars().take(60).collect();
      if first.chars().count() > 60 {
        name.push('…');
      }
      name
    }
    other => other.describe(),
  }
}
