use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about = "A2A agent server with signed push notifications", long_about = None, bin_name = "beacon")]
pub struct Cli {
  /// Address to bind (defaults to `server.default_host`)
  #[arg(long)]
  pub host: Option<String>,
  /// Port to bind (defaults to `server.default_port`)
  #[arg(long)]
  pub port: Option<u16>,
  /// Path to agent_config.toml (overrides BEACON_CONFIG)
  #[arg(long, value_name = "PATH")]
  pub config: Option<PathBuf>,
}
