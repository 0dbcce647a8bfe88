use crate::core::context::RunContext;
use crate::core::error::ShipResult;
use crate::core::params::RunParams;
use crate::core::plan::RunPlan;

/// Show exactly what a run with these parameters would do
pub fn run_plan(ctx: &RunContext, params: &RunParams, json: bool) -> ShipResult<()> {
  let plan = RunPlan::build(&ctx.config, params)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&plan)?);
    return Ok(());
  }

  print_plan(&plan);
  Ok(())
}

pub fn print_plan(plan: &RunPlan) {
  println!("📋 Plan {} for '{}' version {}", plan.id, plan.pipeline, plan.params.version);
  println!(
    "   developer: {} <{}>",
    plan.params.developer_name, plan.params.developer_email
  );
  println!("   docs api:  {}", plan.derived.docs_api);
  println!("   artifacts kept {} day(s)", plan.retention_days);

  for stage in &plan.stages {
    let needs = if stage.needs.is_empty() {
      String::new()
    } else {
      format!(" (after {})", stage.needs.join(", "))
    };
    println!("\n▶️  {}{}", stage.name, needs);
    if stage.is_matrix {
      println!(
        "   {} job(s), up to {} in parallel, fail-fast {}",
        stage.jobs.len(),
        stage.max_parallel,
        if stage.fail_fast { "on" } else { "off" }
      );
    }

    for job in &stage.jobs {
      let indent = if stage.is_matrix {
        println!("   ◆ {}", job.key);
        "     "
      } else {
        "   "
      };
      if let Some(tag) = &job.checkout {
        println!("{}🏷️  checkout tag {}", indent, tag);
      }
      for step in &job.steps {
        let detail = step.action.describe();
        if detail == step.name {
          println!("{}- {}", indent, step.name);
        } else {
          println!("{}- {}: {}", indent, step.name, detail);
        }
      }
    }
  }
}
