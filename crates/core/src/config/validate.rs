use super::types::{Config, ConfigError, Result};

/// Structural checks on the server section. The agent card is validated by
/// the capability registry when the card is built.
pub(super) fn validate_server(cfg: &Config) -> Result<()> {
  if cfg.server.default_host.trim().is_empty() {
    return Err(ConfigError::EmptyHost);
  }
  if cfg.server.notification_timeout_secs == 0 {
    return Err(ConfigError::ZeroNotificationTimeout);
  }
  Ok(())
}
