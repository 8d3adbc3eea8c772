mod api;
mod app;
mod auth;
mod cache;
mod commands;
mod config;
mod error;
mod logging;
mod shell;
mod store;
mod view;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use app::{App, AppCommand, Collaborators};

#[derive(Parser, Debug)]
#[command(name = "cassist")]
#[command(about = "A terminal client for Conjectural Assist projects and requirements")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cassist/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Project id to select on startup
  #[arg(short, long)]
  project: Option<String>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  #[command(flatten)]
  App(AppCommand),
  /// Interactive shell (the default)
  Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override project if specified on command line
  let config = if let Some(project) = args.project {
    config::Config {
      default_project: Some(project),
      ..config
    }
  } else {
    config
  };

  let _log_guard = logging::init(&config)?;
  tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting cassist");

  let collaborators = Collaborators::from_config(&config)?;
  let app = App::new(config, collaborators);
  app.start().await?;

  match args.command.unwrap_or(Command::Shell) {
    Command::Shell => shell::run(&app).await?,
    Command::App(command) => {
      let mut stdout = std::io::stdout();
      app.execute(command, &mut stdout).await?;
    }
  }

  Ok(())
}
