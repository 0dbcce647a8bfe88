mod artifacts;
mod commands;
mod core;
mod graph;
mod pipeline;
mod ui;
mod utils;

use clap::{Args, Parser, Subcommand};
use core::context::{RunContext, find_root};
use core::error::{ShipError, ShipResult, print_error};
use core::params::RunParams;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Release orchestration: bump, tag, build, publish
#[derive(Parser)]
#[command(name = "shipline")]
#[command(version, about, long_about = None)]
#[command(styles = get_styles())]
struct Cli {
  /// Pipeline file (default: shipline.toml, .shipline.toml or .config/shipline.toml)
  #[arg(long, global = true, env = "SHIPLINE_CONFIG")]
  config: Option<PathBuf>,

  /// More log output on stderr (-v info, -vv debug); SHIPLINE_LOG overrides
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Write the default release pipeline to shipline.toml
  Init {
    /// Overwrite an existing pipeline
    #[arg(long)]
    force: bool,
  },

  /// Check the pipeline definition and report missing secrets
  Validate {
    /// Output results in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Show the resolved plan for a release without running it
  Plan {
    #[command(flatten)]
    params: ParamArgs,
    /// Output plan in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Run the release pipeline
  Run {
    #[command(flatten)]
    params: ParamArgs,
    /// Print the plan and stop
    #[arg(long)]
    dry_run: bool,
    /// Output the run report in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Inspect and prune stored artifacts
  #[command(subcommand)]
  Artifacts(ArtifactCommands),
}

#[derive(Subcommand)]
enum ArtifactCommands {
  /// List artifacts and when they expire
  List {
    /// Output results in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Delete artifacts past their retention window
  Prune {
    /// Show what would be deleted
    #[arg(long)]
    dry_run: bool,
    /// Output results in JSON format
    #[arg(long)]
    json: bool,
  },
}

/// Run parameters
#[derive(Args)]
struct ParamArgs {
  /// Release version; also the tag name (e.g. 104.0)
  #[arg(long, env = "SHIPLINE_VERSION")]
  version: String,
  /// Name used for the release commit and tag
  #[arg(long, env = "SHIPLINE_DEVELOPER_NAME")]
  developer_name: String,
  /// Email used for the release commit and tag
  #[arg(long, env = "SHIPLINE_DEVELOPER_EMAIL")]
  developer_email: String,
  /// Documentation project slug
  #[arg(long, env = "SHIPLINE_DOCS_PROJECT")]
  docs_project: String,
}

impl From<ParamArgs> for RunParams {
  fn from(args: ParamArgs) -> Self {
    RunParams {
      version: args.version,
      developer_name: args.developer_name,
      developer_email: args.developer_email,
      docs_project: args.docs_project,
    }
  }
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "shipline=info",
    _ => "shipline=debug",
  };
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_env("SHIPLINE_LOG").unwrap_or_else(|_| default.into()))
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let current_dir = match std::env::current_dir() {
    Ok(dir) => dir,
    Err(e) => handle_error(ShipError::from(e).context("Failed to get current directory")),
  };

  let config = cli.config.as_deref();
  let result = match cli.command {
    Commands::Init { force } => commands::run_init(&find_root(&current_dir), force),
    Commands::Validate { json } => with_context(&current_dir, config, |ctx| commands::run_validate(ctx, json)),
    Commands::Plan { params, json } => {
      let params = RunParams::from(params);
      with_context(&current_dir, config, |ctx| commands::run_plan(ctx, &params, json))
    }
    Commands::Run { params, dry_run, json } => {
      let params = RunParams::from(params);
      with_context(&current_dir, config, |ctx| commands::run_pipeline(ctx, &params, dry_run, json))
    }
    Commands::Artifacts(cmd) => {
      let store = artifacts::ArtifactStore::for_repo(&find_root(&current_dir));
      match cmd {
        ArtifactCommands::List { json } => commands::run_artifacts_list(&store, json),
        ArtifactCommands::Prune { dry_run, json } => commands::run_artifacts_prune(&store, dry_run, json),
      }
    }
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

/// Build the run context once and hand it to a command
fn with_context(
  current_dir: &Path,
  config: Option<&Path>,
  command: impl FnOnce(&RunContext) -> ShipResult<()>,
) -> ShipResult<()> {
  let ctx = RunContext::build(current_dir, config)?;
  command(&ctx)
}

fn handle_error(err: ShipError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
