//! Configuration for the beacon server.
//!
//! A project file (`agent_config.toml`) is layered over an optional global
//! file and the built-in defaults. The `[agent_card]` table is carried
//! through unvalidated; `crate::card::build` owns its validation.

mod defaults;
mod load;
mod paths;
mod types;
mod validate;

pub use defaults::{CONFIG_ENV, CONFIG_FILE_NAME};
pub use load::{from_toml_str, load, load_from_paths};
pub use paths::{global_config_path, project_config_path, resolve_config_path};
pub use types::{
  AgentCardConfig, CapabilitiesConfig, Config, ConfigError, LogFormat, LogLevel, LoggingConfig,
  Result, ServerConfig, SkillConfig,
};
