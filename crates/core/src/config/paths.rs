use std::env;
use std::path::{Path, PathBuf};

use super::defaults::{CONFIG_ENV, CONFIG_FILE_NAME};

/// Location of the global config file (~/.config/beacon/agent_config.toml)
pub fn global_config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|p| p.join("beacon").join(CONFIG_FILE_NAME))
}

/// Location of the project config file (./agent_config.toml)
pub fn project_config_path(project_root: &Path) -> PathBuf {
  project_root.join(CONFIG_FILE_NAME)
}

/// Resolve the project config path: explicit flag, then BEACON_CONFIG, then the working directory.
pub fn resolve_config_path(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
  if let Some(p) = explicit {
    return p.to_path_buf();
  }
  resolve_config_path_for(env::var_os(CONFIG_ENV).map(PathBuf::from), cwd)
}

pub(crate) fn resolve_config_path_for(env_path: Option<PathBuf>, cwd: &Path) -> PathBuf {
  match env_path {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => project_config_path(cwd),
  }
}
