//! Core library for the Beacon agent server.
//!
//! Serves an A2A agent over HTTP: the agent card at
//! `/.well-known/agent.json`, the public signing keys at
//! `/.well-known/jwks.json`, and JSON-RPC task methods (`tasks/send`,
//! `tasks/get`, `tasks/cancel`, `tasks/sendSubscribe` and the push
//! notification pair) at `/`. Task updates can be pushed to client webhooks;
//! every push carries a signed token that receivers check with
//! [`push::NotificationVerifier`].
//!
//! Quick start:
//! - Load config via `beacon_core::config::load(&path)`.
//! - Run `startup::Startup::new(options, agent).prepare()?.serve().await`.

pub mod agent;
pub mod card;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod domain;
pub mod keys;
pub mod logging;
pub mod push;
pub mod rpc;
pub mod server;
pub mod startup;
