//! Pipeline runner
//!
//! ## Execution model
//!
//! - Stages run one at a time in plan order; a stage starts only after every
//!   stage it needs has finished with success, otherwise it is skipped
//! - Jobs of a stage run in parallel on a dedicated rayon pool sized by
//!   `max_parallel`
//! - Steps of a job run sequentially; the first failure ends the job
//! - With `fail_fast`, the first failed job cancels its siblings: jobs that
//!   have not started never start, running jobs stop before their next step
//! - A job with a checkout runs in its own detached worktree at the tag,
//!   verified before any step runs

use crate::core::context::RunContext;
use crate::core::error::{GitError, ShipError, ShipResult};
use crate::core::plan::{PlannedJob, PlannedStage, RunPlan};
use crate::core::vcs::{Identity, SystemGit};
use crate::pipeline::report::{CheckoutRecord, JobReport, RunReport, StageReport, Status, StepReport};
use crate::pipeline::step::{StepEnv, execute};
use crate::ui::progress::StageProgress;
use crate::utils::duration_ms;
use chrono::Utc;
use linya::Bar;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

pub struct PipelineRunner<'a> {
  ctx: &'a RunContext,
  plan: &'a RunPlan,
  run_id: String,
  show_progress: bool,
  /// Serializes `git worktree` changes on the shared repository
  worktree_lock: Mutex<()>,
}

impl<'a> PipelineRunner<'a> {
  pub fn new(ctx: &'a RunContext, plan: &'a RunPlan) -> Self {
    let run_id = format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), plan.id.short());
    Self {
      ctx,
      plan,
      run_id,
      show_progress: false,
      worktree_lock: Mutex::new(()),
    }
  }

  /// Print stage headers and per-job progress bars
  pub fn with_progress(mut self, show: bool) -> Self {
    self.show_progress = show;
    self
  }

  /// Execute every stage and write the run report
  ///
  /// Step failures are recorded in the report, not returned; errors here
  /// mean the run itself could not proceed.
  pub fn run(&self) -> ShipResult<RunReport> {
    let started_at = Utc::now();
    let identity = Identity {
      name: self.plan.params.developer_name.clone(),
      email: self.plan.params.developer_email.clone(),
    };
    tracing::info!(run_id = %self.run_id, plan_id = %self.plan.id, version = %self.plan.params.version, "starting run");

    let mut outcomes: HashMap<&str, Status> = HashMap::new();
    let mut stages = Vec::with_capacity(self.plan.stages.len());

    for stage in &self.plan.stages {
      let blocked: Vec<&str> = stage
        .needs
        .iter()
        .map(String::as_str)
        .filter(|need| outcomes.get(need) != Some(&Status::Success))
        .collect();

      let report = if blocked.is_empty() {
        self.run_stage(stage, &identity)?
      } else {
        let reason = format!("needs {} which did not succeed", blocked.join(", "));
        tracing::warn!(stage = %stage.name, %reason, "skipping stage");
        if self.show_progress {
          println!("\n⏭️  Stage '{}' skipped: {}", stage.name, reason);
        }
        StageReport::skipped(&stage.name, reason)
      };

      outcomes.insert(&stage.name, report.status);
      stages.push(report);
    }

    let report = RunReport {
      run_id: self.run_id.clone(),
      plan_id: self.plan.id.as_str().to_string(),
      pipeline: self.plan.pipeline.clone(),
      version: self.plan.params.version.clone(),
      started_at,
      finished_at: Utc::now(),
      stages,
    };

    let path = report.save(&self.ctx.runs_dir())?;
    tracing::info!(path = %path.display(), succeeded = report.succeeded(), "run finished");

    let work_dir = self.ctx.work_dir(&self.run_id);
    if work_dir.exists()
      && let Err(e) = fs::remove_dir_all(&work_dir)
    {
      tracing::warn!(path = %work_dir.display(), error = %e, "failed to clean up work directory");
    }

    Ok(report)
  }

  fn run_stage(&self, stage: &PlannedStage, identity: &Identity) -> ShipResult<StageReport> {
    let span = tracing::info_span!("stage", name = %stage.name);
    let _enter = span.enter();
    tracing::info!(jobs = stage.jobs.len(), fail_fast = stage.fail_fast, max_parallel = stage.max_parallel, "starting stage");

    if self.show_progress {
      println!("\n▶️  Stage '{}' ({} job(s))", stage.name, stage.jobs.len());
    }

    let started_at = Utc::now();
    let cancel = AtomicBool::new(false);
    let progress = self.show_progress.then(StageProgress::new);
    let bars: Vec<Option<Bar>> = stage
      .jobs
      .iter()
      .map(|job| {
        progress
          .as_ref()
          .and_then(|p| p.add_job(job.steps.len(), job_label(stage, job)))
      })
      .collect();

    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(stage.max_parallel)
      .thread_name(|i| format!("shipline-job-{}", i))
      .build()?;

    let jobs: Vec<JobReport> = pool.install(|| {
      stage
        .jobs
        .par_iter()
        .zip(bars.par_iter())
        .map(|(job, bar)| {
          let tracker = progress.as_ref().zip(bar.as_ref());
          self.run_job(stage, job, identity, &cancel, tracker)
        })
        .collect()
    });

    let status = StageReport::status_from_jobs(&jobs);
    let report = StageReport {
      name: stage.name.clone(),
      status,
      reason: None,
      started_at: Some(started_at),
      finished_at: Some(Utc::now()),
      jobs,
    };
    tracing::info!(
      %status,
      failed = report.count(Status::Failed),
      cancelled = report.count(Status::Cancelled),
      "stage finished"
    );
    Ok(report)
  }

  fn run_job(
    &self,
    stage: &PlannedStage,
    job: &PlannedJob,
    identity: &Identity,
    cancel: &AtomicBool,
    progress: Option<(&StageProgress, &Bar)>,
  ) -> JobReport {
    let span = tracing::info_span!("job", stage = %stage.name, key = %job.key);
    let _enter = span.enter();
    let start = Instant::now();

    let mut report = JobReport {
      key: job.key.clone(),
      status: Status::Success,
      checkout: None,
      duration_ms: 0,
      steps: Vec::with_capacity(job.steps.len()),
    };

    if cancel.load(Ordering::SeqCst) {
      tracing::info!("cancelled before start");
      report.status = Status::Cancelled;
      report.steps = job.steps.iter().map(|s| not_run(&s.name, Status::Cancelled)).collect();
      if let Some((p, bar)) = progress {
        p.finish(bar, job.steps.len());
      }
      return report;
    }

    let worktree = match &job.checkout {
      Some(tag) => match self.checkout(stage, job, tag) {
        Ok((path, record)) => {
          tracing::info!(tag = %record.tag, commit = %record.commit, "checked out");
          report.checkout = Some(record);
          Some(path)
        }
        Err(e) => {
          let message = self.ctx.secrets.redact(&e.to_string());
          tracing::error!(tag = %tag, error = %message, "checkout failed");
          report.status = Status::Failed;
          report.steps.push(StepReport {
            name: format!("checkout {}", tag),
            status: Status::Failed,
            duration_ms: 0,
            error: Some(message),
          });
          report
            .steps
            .extend(job.steps.iter().map(|s| not_run(&s.name, Status::Skipped)));
          if stage.fail_fast {
            cancel.store(true, Ordering::SeqCst);
          }
          if let Some((p, bar)) = progress {
            p.finish(bar, job.steps.len());
          }
          report.duration_ms = duration_ms(start.elapsed());
          return report;
        }
      },
      None => None,
    };

    let env = StepEnv {
      run_id: &self.run_id,
      work_dir: worktree.as_deref().unwrap_or(&self.ctx.root),
      env: &job.env,
      identity,
      secrets: &self.ctx.secrets,
      store: &self.ctx.store,
    };

    for step in &job.steps {
      if report.status != Status::Success {
        report.steps.push(not_run(&step.name, Status::Skipped));
        continue;
      }
      if cancel.load(Ordering::SeqCst) {
        tracing::info!(step = %step.name, "cancelled by failed sibling");
        report.status = Status::Cancelled;
        report.steps.push(not_run(&step.name, Status::Cancelled));
        continue;
      }

      let step_start = Instant::now();
      let result = execute(step, &env);
      let elapsed = duration_ms(step_start.elapsed());

      match result {
        Ok(()) => {
          tracing::debug!(step = %step.name, duration_ms = elapsed, "step succeeded");
          report.steps.push(StepReport {
            name: step.name.clone(),
            status: Status::Success,
            duration_ms: elapsed,
            error: None,
          });
        }
        Err(e) => {
          let message = self.ctx.secrets.redact(&e.to_string());
          tracing::error!(step = %step.name, error = %message, "step failed");
          report.status = Status::Failed;
          report.steps.push(StepReport {
            name: step.name.clone(),
            status: Status::Failed,
            duration_ms: elapsed,
            error: Some(message),
          });
          if stage.fail_fast {
            cancel.store(true, Ordering::SeqCst);
          }
        }
      }

      if let Some((p, bar)) = progress {
        p.step_done(bar);
      }
    }

    if report.status != Status::Success
      && let Some((p, bar)) = progress
    {
      p.finish(bar, job.steps.len());
    }

    if let Some(path) = &worktree {
      self.remove_worktree(path);
    }

    report.duration_ms = duration_ms(start.elapsed());
    report
  }

  /// Create the job's worktree at `tag` and verify HEAD carries the tag
  fn checkout(&self, stage: &PlannedStage, job: &PlannedJob, tag: &str) -> ShipResult<(PathBuf, CheckoutRecord)> {
    let repo = SystemGit::open(&self.ctx.root)?;
    let commit = repo.resolve_tag(tag)?;
    let path = self
      .ctx
      .work_dir(&self.run_id)
      .join(path_segment(&stage.name))
      .join(&job.slug);

    {
      let _guard = self.worktree_lock.lock().map_err(|_| "worktree lock poisoned")?;
      if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
      }
      repo.add_worktree(&path, &commit)?;
    }

    match verify_checkout(&path, tag, &commit) {
      Ok(()) => Ok((
        path,
        CheckoutRecord {
          tag: tag.to_string(),
          commit,
        },
      )),
      Err(e) => {
        self.remove_worktree(&path);
        Err(e)
      }
    }
  }

  fn remove_worktree(&self, path: &Path) {
    let result = self
      .worktree_lock
      .lock()
      .map_err(|_| ShipError::message("worktree lock poisoned"))
      .and_then(|_guard| SystemGit::open(&self.ctx.root)?.remove_worktree(path));
    if let Err(e) = result {
      tracing::warn!(path = %path.display(), error = %e, "failed to remove worktree");
    }
  }
}

fn verify_checkout(path: &Path, tag: &str, commit: &str) -> ShipResult<()> {
  let worktree = SystemGit::open(path)?;
  let head = worktree.head_commit()?;
  let tags = worktree.tags_at_head()?;
  if head != commit || !tags.iter().any(|t| t == tag) {
    return Err(
      GitError::CheckoutMismatch {
        expected: tag.to_string(),
        found: if tags.is_empty() { head } else { tags.join(", ") },
      }
      .into(),
    );
  }
  Ok(())
}

fn not_run(name: &str, status: Status) -> StepReport {
  StepReport {
    name: name.to_string(),
    status,
    duration_ms: 0,
    error: None,
  }
}

fn job_label(stage: &PlannedStage, job: &PlannedJob) -> String {
  if job.key.is_empty() {
    stage.name.clone()
  } else {
    format!("{} [{}]", stage.name, job.key)
  }
}

fn path_segment(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect()
}
