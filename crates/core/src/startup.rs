//! Startup sequence of the server process.
//!
//! `Unconfigured → CredentialsChecked → KeysGenerated → CardBuilt →
//! RoutesMounted → Serving`. Every step before `Serving` is pure setup; the
//! socket is bound only when serving starts, so a failure anywhere earlier
//! leaves nothing listening.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::agent::Agent;
use crate::card::{self, AgentCard, CapabilityConfig, ConfigValidationError};
use crate::config::{Config, ConfigError};
use crate::credentials::{self, MissingCredentialError};
use crate::dispatcher::TaskManager;
use crate::keys::{KeyError, KeyManager, KeySetDocument};
use crate::push::NotificationSender;
use crate::server::{self, Routes, ServerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupPhase {
  Unconfigured,
  CredentialsChecked,
  KeysGenerated,
  CardBuilt,
  RoutesMounted,
  Serving,
}

impl fmt::Display for StartupPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      StartupPhase::Unconfigured => "unconfigured",
      StartupPhase::CredentialsChecked => "credentials_checked",
      StartupPhase::KeysGenerated => "keys_generated",
      StartupPhase::CardBuilt => "card_built",
      StartupPhase::RoutesMounted => "routes_mounted",
      StartupPhase::Serving => "serving",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Error)]
pub enum StartupError {
  #[error(transparent)]
  MissingCredential(#[from] MissingCredentialError),
  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),
  #[error("invalid agent card: {0}")]
  CardValidation(#[from] ConfigValidationError),
  #[error("signing keys: {0}")]
  Keys(#[from] KeyError),
  #[error("http client: {0}")]
  HttpClient(#[from] reqwest::Error),
  #[error("cannot bind {addr}: {source}")]
  Bind { addr: String, source: io::Error },
}

/// Resolved inputs of a startup run.
#[derive(Debug, Clone)]
pub struct StartupOptions {
  pub host: String,
  pub port: u16,
  pub config: Config,
}

impl StartupOptions {
  /// Use the config's bind defaults unless overridden.
  pub fn new(config: Config, host: Option<String>, port: Option<u16>) -> Self {
    Self {
      host: host.unwrap_or_else(|| config.server.default_host.clone()),
      port: port.unwrap_or(config.server.default_port),
      config,
    }
  }
}

/// Drives the phases up to `RoutesMounted`.
pub struct Startup {
  phase: StartupPhase,
  options: StartupOptions,
  agent: Arc<dyn Agent>,
}

impl Startup {
  pub fn new(options: StartupOptions, agent: Arc<dyn Agent>) -> Self {
    Self {
      phase: StartupPhase::Unconfigured,
      options,
      agent,
    }
  }

  pub fn phase(&self) -> StartupPhase {
    self.phase
  }

  /// Run setup against the process environment.
  pub fn prepare(self) -> Result<PreparedServer, StartupError> {
    self.prepare_with(|name| std::env::var(name).ok())
  }

  /// Run setup with credentials read through `lookup`.
  pub fn prepare_with<F>(mut self, lookup: F) -> Result<PreparedServer, StartupError>
  where
    F: Fn(&str) -> Option<String>,
  {
    credentials::check_with(lookup)?;
    self.advance(StartupPhase::CredentialsChecked);

    let keys = Arc::new(KeyManager::new());
    keys.generate_keys()?;
    self.advance(StartupPhase::KeysGenerated);

    let StartupOptions { host, port, config } = self.options;
    let card = card::build(CapabilityConfig::new(
      config.agent_card,
      &host,
      port,
      self.agent.supported_content_types(),
    ))?;
    info!(event = "agent_card_built", name = %card.name, version = %card.version, url = %card.url, skills = card.skills.len());
    self.phase = StartupPhase::CardBuilt;
    log_phase(self.phase);

    let timeout = Duration::from_secs(config.server.notification_timeout_secs);
    let sender = NotificationSender::new(keys.clone(), timeout)?;
    let tasks = TaskManager::new(self.agent.clone(), sender, card.capabilities.push_notifications);
    let routes = Routes::mount(Arc::new(card), keys, tasks);
    info!(event = "routes_mounted", methods = ?routes.method_names(), "routes mounted");
    log_phase(StartupPhase::RoutesMounted);

    Ok(PreparedServer {
      host,
      port,
      routes: Arc::new(routes),
    })
  }

  fn advance(&mut self, next: StartupPhase) {
    self.phase = next;
    log_phase(next);
  }
}

fn log_phase(phase: StartupPhase) {
  info!(event = "startup_phase", phase = %phase, "startup advanced");
}

/// Fully wired server that has not bound a socket yet.
pub struct PreparedServer {
  host: String,
  port: u16,
  routes: Arc<Routes>,
}

impl PreparedServer {
  pub fn phase(&self) -> StartupPhase {
    StartupPhase::RoutesMounted
  }

  pub fn card(&self) -> &AgentCard {
    self.routes.card()
  }

  pub fn key_set(&self) -> Result<KeySetDocument, KeyError> {
    self.routes.keys().public_key_set()
  }

  pub fn routes(&self) -> &Arc<Routes> {
    &self.routes
  }

  /// Bind host:port and start serving in the background.
  pub async fn bind(self) -> Result<ServerHandle, StartupError> {
    let addr = format!("{}:{}", self.host, self.port);
    let bind_err = |source| StartupError::Bind {
      addr: addr.clone(),
      source,
    };
    let listener = server::bind(&self.host, self.port).await.map_err(bind_err)?;
    let handle = server::start(listener, self.routes).map_err(bind_err)?;
    info!(event = "startup_phase", phase = %StartupPhase::Serving, addr = %handle.local_addr(), "startup advanced");
    Ok(handle)
  }

  /// Bind and serve until ctrl-c.
  pub async fn serve(self) -> Result<(), StartupError> {
    info!(event = "server_starting", host = %self.host, port = self.port, "Starting server on {}:{}", self.host, self.port);
    let handle = self.bind().await?;
    let shutdown = handle.shutdown_sender();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        info!(event = "ctrl_c", "interrupt received");
        let _ = shutdown.send(true);
      }
    });
    handle.wait().await;
    Ok(())
  }
}
