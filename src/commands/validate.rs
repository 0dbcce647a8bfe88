use serde::Serialize;

use crate::core::context::RunContext;
use crate::core::error::ShipResult;
use crate::graph::StageGraph;

#[derive(Debug, Serialize)]
struct ValidationSummary {
  pipeline: String,
  stages: Vec<StageSummary>,
  secrets: Vec<SecretSummary>,
}

#[derive(Debug, Serialize)]
struct StageSummary {
  name: String,
  needs: Vec<String>,
  jobs: usize,
  fail_fast: bool,
}

#[derive(Debug, Serialize)]
struct SecretSummary {
  name: String,
  present: bool,
}

/// Report on a pipeline that already passed validation while loading
///
/// Missing secrets are reported, not fatal: a run only needs the secrets of
/// the steps it reaches.
pub fn run_validate(ctx: &RunContext, json: bool) -> ShipResult<()> {
  let config = &ctx.config;
  let graph = StageGraph::build(&config.stages)?;

  let mut stages = Vec::with_capacity(config.stages.len());
  for name in graph.topological_order()? {
    if let Some(stage) = config.stage(&name) {
      stages.push(StageSummary {
        name: stage.name.clone(),
        needs: stage.needs.clone(),
        jobs: stage.matrix.as_ref().map_or(1, |m| m.expand().len()),
        fail_fast: stage.fail_fast,
      });
    }
  }

  let secrets: Vec<SecretSummary> = config
    .secret_names()
    .into_iter()
    .map(|name| SecretSummary {
      name: name.to_string(),
      present: ctx.secrets.contains(name),
    })
    .collect();

  let summary = ValidationSummary {
    pipeline: config.pipeline.name.clone(),
    stages,
    secrets,
  };

  if json {
    println!("{}", serde_json::to_string_pretty(&summary)?);
    return Ok(());
  }

  println!("✅ Pipeline '{}' is valid\n", summary.pipeline);
  println!("📋 Stages (execution order):");
  for stage in &summary.stages {
    let needs = if stage.needs.is_empty() {
      String::new()
    } else {
      format!(" ← {}", stage.needs.join(", "))
    };
    let fail_fast = if stage.jobs > 1 && !stage.fail_fast { ", fail-fast off" } else { "" };
    println!("   • {} ({} job(s){}){}", stage.name, stage.jobs, fail_fast, needs);
  }

  if !summary.secrets.is_empty() {
    println!("\n🔑 Secrets:");
    for secret in &summary.secrets {
      let mark = if secret.present { "✅" } else { "⚠️ " };
      println!("   {} {}", mark, secret.name);
    }
    let missing = summary.secrets.iter().filter(|s| !s.present).count();
    if missing > 0 {
      println!("\n💡 {} secret(s) not set; steps that use them will fail.", missing);
    }
  }
  Ok(())
}
