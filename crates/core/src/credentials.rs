//! Pre-flight check for the external credentials the agent needs.

use std::env;

use thiserror::Error;

/// Inference provider key.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Weather data provider key.
pub const OPENWEATHERMAP_API_KEY: &str = "OPENWEATHERMAP_API_KEY";

/// Checked in this order; the first missing one is reported.
pub const REQUIRED_CREDENTIALS: [&str; 2] = [OPENAI_API_KEY, OPENWEATHERMAP_API_KEY];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} environment variable not set.")]
pub struct MissingCredentialError {
  pub name: &'static str,
}

/// Proof that every required credential was present. Values are not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialsChecked(());

/// Check the process environment.
pub fn check_env() -> Result<CredentialsChecked, MissingCredentialError> {
  check_with(|name| env::var(name).ok())
}

/// Check credentials through an arbitrary lookup. Empty values count as missing.
pub fn check_with<F>(lookup: F) -> Result<CredentialsChecked, MissingCredentialError>
where
  F: Fn(&str) -> Option<String>,
{
  for name in REQUIRED_CREDENTIALS {
    match lookup(name) {
      Some(value) if !value.is_empty() => {}
      _ => return Err(MissingCredentialError { name }),
    }
  }
  Ok(CredentialsChecked(()))
}
