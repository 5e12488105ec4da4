use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::defaults::{DEFAULT_HOST, DEFAULT_NOTIFICATION_TIMEOUT_SECS, DEFAULT_PORT};

/// Log level for the server and CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Off,
  Error,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

/// Output format of the stderr log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Text,
  Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
  pub format: LogFormat,
  /// Optional JSON lines file written in addition to stderr.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file: Option<String>,
}

/// Bind defaults and outbound HTTP settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
  pub default_host: String,
  pub default_port: u16,
  /// Upper bound for a single push notification request (defaults to 10)
  pub notification_timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      default_host: DEFAULT_HOST.to_string(),
      default_port: DEFAULT_PORT,
      notification_timeout_secs: DEFAULT_NOTIFICATION_TIMEOUT_SECS,
    }
  }
}

/// Optional protocol features advertised on the agent card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesConfig {
  #[serde(default)]
  pub streaming: bool,
  #[serde(default)]
  pub push_notifications: bool,
  #[serde(default)]
  pub state_transition_history: bool,
}

/// A skill entry as written in the config file. Fields stay optional so the
/// capability registry can report exactly what is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SkillConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub examples: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub input_modes: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_modes: Option<Vec<String>>,
}

/// The `[agent_card]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentCardConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default)]
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default)]
  pub capabilities: CapabilitiesConfig,
  #[serde(default)]
  pub skills: Vec<SkillConfig>,
}

/// Effective configuration after merging defaults, global, and project config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
  pub log_level: LogLevel,
  pub logging: LoggingConfig,
  pub server: ServerConfig,
  pub agent_card: AgentCardConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("toml: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("config file not found: {0}")]
  NotFound(String),
  #[error("server.default_host must not be empty")]
  EmptyHost,
  #[error("server.notification_timeout_secs must be greater than zero")]
  ZeroNotificationTimeout,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
