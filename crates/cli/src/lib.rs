pub mod args;

use std::path::Path;
use std::sync::Arc;

use beacon_core::agent::EchoAgent;
use beacon_core::config::{self, Config, ConfigError};
use beacon_core::logging;
use beacon_core::startup::{Startup, StartupError, StartupOptions};
use clap::Parser;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum CliError {
  #[error("cannot determine working directory: {0}")]
  Cwd(std::io::Error),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("cannot initialize logging: {0}")]
  Logging(std::io::Error),
  #[error("cannot start runtime: {0}")]
  Runtime(std::io::Error),
  #[error(transparent)]
  Startup(#[from] StartupError),
}

/// Run the server; returns the process exit code.
pub fn run() -> i32 {
  let cli = args::Cli::parse();
  let cfg = match load_config(&cli) {
    Ok(cfg) => cfg,
    Err(e) => {
      // logging is not up yet
      eprintln!("beacon: {e}");
      return 1;
    }
  };
  let _guard = match logging::init(cfg.log_level, &cfg.logging) {
    Ok(guard) => guard,
    Err(e) => {
      eprintln!("beacon: {}", CliError::Logging(e));
      return 1;
    }
  };
  match serve(cli, cfg) {
    Ok(()) => 0,
    Err(e) => {
      error!(event = "startup_failed", error = %e, "{e}");
      1
    }
  }
}

fn load_config(cli: &args::Cli) -> Result<Config, CliError> {
  let cwd = std::env::current_dir().map_err(CliError::Cwd)?;
  let path = config::resolve_config_path(cli.config.as_deref(), &cwd);
  load_config_at(&path)
}

fn load_config_at(path: &Path) -> Result<Config, CliError> {
  Ok(config::load(path)?)
}

fn serve(cli: args::Cli, cfg: Config) -> Result<(), CliError> {
  let options = StartupOptions::new(cfg, cli.host, cli.port);

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .map_err(CliError::Runtime)?;
  runtime.block_on(async move {
    let prepared = Startup::new(options, Arc::new(EchoAgent)).prepare()?;
    prepared.serve().await?;
    Ok::<(), CliError>(())
  })
}
