pub(crate) const DEFAULT_HOST: &str = "localhost";
pub(crate) const DEFAULT_PORT: u16 = 10000;
pub(crate) const DEFAULT_NOTIFICATION_TIMEOUT_SECS: u64 = 10;

/// File name looked up in the working directory and the global config dir.
pub const CONFIG_FILE_NAME: &str = "agent_config.toml";

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "BEACON_CONFIG";
