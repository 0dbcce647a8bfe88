use crate::commands::plan::print_plan;
use crate::core::context::RunContext;
use crate::core::error::{ShipError, ShipResult};
use crate::core::params::RunParams;
use crate::core::plan::RunPlan;
use crate::pipeline::report::{RunReport, Status};
use crate::pipeline::PipelineRunner;

/// Plan and execute a release
///
/// Returns `PipelineFailed` when any stage did not succeed; the report is
/// written either way. With `dry_run` only the plan is printed.
pub fn run_pipeline(ctx: &RunContext, params: &RunParams, dry_run: bool, json: bool) -> ShipResult<()> {
  let plan = RunPlan::build(&ctx.config, params)?;

  if dry_run {
    if json {
      println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
      print_plan(&plan);
      println!("\n💡 Dry run: nothing was executed.");
    }
    return Ok(());
  }

  if !json {
    print_plan(&plan);
    println!("\n🚀 Running {} stage(s), {} job(s)", plan.stages.len(), plan.job_count());
  }

  let runner = PipelineRunner::new(ctx, &plan).with_progress(!json);
  let report = runner.run()?;

  if json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    print_summary(&report);
    println!(
      "\n📄 Report: {}",
      RunReport::report_path(&ctx.runs_dir(), &report.run_id).display()
    );
  }

  if report.succeeded() {
    if !json {
      println!("\n🎉 Released {}", report.version);
    }
    Ok(())
  } else {
    Err(ShipError::PipelineFailed {
      failed: report.unsuccessful_stages(),
    })
  }
}

fn print_summary(report: &RunReport) {
  println!("\n📊 Summary for run {}", report.run_id);
  for stage in &report.stages {
    println!("{} {} ({})", stage.status.icon(), stage.name, stage.status);
    if let Some(reason) = &stage.reason {
      println!("   {}", reason);
    }

    for job in &stage.jobs {
      let label = if job.key.is_empty() { stage.name.as_str() } else { job.key.as_str() };
      let checkout = job
        .checkout
        .as_ref()
        .map(|c| format!(" @ {} ({})", c.tag, &c.commit[..c.commit.len().min(12)]))
        .unwrap_or_default();
      println!(
        "   {} {}{} in {:.1}s",
        job.status.icon(),
        label,
        checkout,
        job.duration_ms as f64 / 1000.0
      );

      for step in job.steps.iter().filter(|s| s.status == Status::Failed) {
        println!("      ❌ {}", step.name);
        if let Some(error) = &step.error {
          for line in error.lines() {
            println!("         {}", line);
          }
        }
      }
    }
  }
}
