use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::paths::global_config_path;
use super::types::{
  AgentCardConfig, Config, ConfigError, LogFormat, LogLevel, LoggingConfig, Result, ServerConfig,
};
use super::validate::validate_server;

/// Load configuration from the project file at `project_path`, layered over the
/// global config and the built-in defaults. The project file must exist.
pub fn load(project_path: &Path) -> Result<Config> {
  load_from_paths(global_config_path().as_deref(), project_path)
}

/// Load configuration from explicit file paths. A missing global file is skipped.
pub fn load_from_paths(global: Option<&Path>, project: &Path) -> Result<Config> {
  let mut cfg = Config::default();

  if let Some(g) = global
    && let Ok(s) = fs::read_to_string(g)
  {
    let partial: PartialConfig = toml::from_str(&s)?;
    cfg = partial.merge_over(cfg);
  }

  let s = match fs::read_to_string(project) {
    Ok(s) => s,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Err(ConfigError::NotFound(project.display().to_string()));
    }
    Err(e) => return Err(e.into()),
  };
  cfg = parse_partial(&s)?.merge_over(cfg);

  validate_server(&cfg)?;

  Ok(cfg)
}

/// Parse a config document on its own, layered over defaults only.
pub fn from_toml_str(s: &str) -> Result<Config> {
  let cfg = parse_partial(s)?.merge_over(Config::default());
  validate_server(&cfg)?;
  Ok(cfg)
}

fn parse_partial(s: &str) -> Result<PartialConfig> {
  Ok(toml::from_str(s)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialServerConfig {
  pub default_host: Option<String>,
  pub default_port: Option<u16>,
  pub notification_timeout_secs: Option<u64>,
}

impl PartialServerConfig {
  fn merge_over(self, base: ServerConfig) -> ServerConfig {
    ServerConfig {
      default_host: self.default_host.unwrap_or(base.default_host),
      default_port: self.default_port.unwrap_or(base.default_port),
      notification_timeout_secs: self
        .notification_timeout_secs
        .unwrap_or(base.notification_timeout_secs),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
  pub format: Option<LogFormat>,
  pub file: Option<String>,
}

impl PartialLoggingConfig {
  fn merge_over(self, base: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
      format: self.format.unwrap_or(base.format),
      file: self.file.or(base.file),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct PartialConfig {
  pub log_level: Option<LogLevel>,
  pub logging: Option<PartialLoggingConfig>,
  pub server: Option<PartialServerConfig>,
  /// The card is replaced as a whole; skill lists are never spliced across files.
  pub agent_card: Option<AgentCardConfig>,
}

impl PartialConfig {
  fn merge_over(self, base: Config) -> Config {
    let PartialConfig {
      log_level,
      logging,
      server,
      agent_card,
    } = self;

    let Config {
      log_level: base_log_level,
      logging: base_logging,
      server: base_server,
      agent_card: base_agent_card,
    } = base;

    Config {
      log_level: log_level.unwrap_or(base_log_level),
      logging: logging.unwrap_or_default().merge_over(base_logging),
      server: server.unwrap_or_default().merge_over(base_server),
      agent_card: agent_card.unwrap_or(base_agent_card),
    }
  }
}
