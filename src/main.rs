use cargo_shipyard::commands::{self, PublishArgs};
use cargo_shipyard::core::context::WorkspaceContext;
use cargo_shipyard::core::error::{ShipyardError, print_error};
use cargo_shipyard::exec::runner_from_env;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (defaults to `info`)
const LOG_ENV: &str = "SHIPYARD_LOG";

/// Publish every crate of a Cargo workspace in dependency order
#[derive(Parser)]
#[command(name = "cargo")]
#[command(bin_name = "cargo")]
#[command(styles = get_styles())]
enum CargoCli {
  Shipyard(ShipyardCli),
}

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct ShipyardCli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Stage the workspace, run preflight checks, then package and publish each crate
  Publish {
    /// Fail if the workspace has uncommitted changes
    #[arg(long)]
    forbid_dirty: bool,
    /// Upload to the registry (default: `cargo publish --dry-run` only)
    #[arg(long)]
    live: bool,
    /// Directory to stage into (default: a fresh temporary directory)
    #[arg(long, value_name = "PATH")]
    build_dir: Option<PathBuf>,
  },

  /// Print the publish plan without running anything
  Plan,
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

fn init_logging() -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_env(LOG_ENV).or_else(|_| EnvFilter::try_new("info"))?;
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .with_target(false)
    .try_init()
    .map_err(|e| anyhow::anyhow!(e))?;
  Ok(())
}

fn main() {
  let CargoCli::Shipyard(cli) = CargoCli::parse();

  if let Err(e) = init_logging() {
    eprintln!("Warning: logging disabled: {}", e);
  }

  let workspace_root = match std::env::current_dir() {
    Ok(dir) => dir,
    Err(e) => {
      eprintln!("Error: Failed to get current directory: {}", e);
      std::process::exit(1);
    }
  };

  // Fails fast when the stub backend is requested without a socket
  let runner = match runner_from_env() {
    Ok(runner) => runner,
    Err(e) => handle_error(e),
  };

  let ctx = match WorkspaceContext::build(&workspace_root, runner.as_ref()) {
    Ok(ctx) => ctx,
    Err(e) => handle_error(e),
  };

  let result = match cli.command {
    Commands::Publish {
      forbid_dirty,
      live,
      build_dir,
    } => commands::run_publish(
      &ctx,
      runner.as_ref(),
      PublishArgs {
        forbid_dirty,
        live,
        build_dir,
      },
    ),
    Commands::Plan => commands::run_plan(&ctx),
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: ShipyardError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
