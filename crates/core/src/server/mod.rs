//! HTTP front door: discovery document, key set, and JSON-RPC task calls
//! served by hyper on a tokio TCP listener.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

mod api;
mod routes;

pub use routes::{JWKS_PATH, RPC_PATH, Routes};

/// Create a shutdown channel for coordinating server termination.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
  watch::channel(false)
}

/// Handle to the running server.
pub struct ServerHandle {
  task: JoinHandle<()>,
  local_addr: SocketAddr,
  shutdown_tx: watch::Sender<bool>,
}

impl ServerHandle {
  /// Stop accepting connections and abort the accept loop.
  pub fn stop(self) {
    let _ = self.shutdown_tx.send(true);
    self.task.abort();
  }

  /// Await the accept loop to finish (e.g., after shutdown).
  pub async fn wait(self) {
    let ServerHandle {
      task, shutdown_tx, ..
    } = self;
    let _ = task.await;
    drop(shutdown_tx);
  }

  /// Sender that ends the accept loop when `true` is sent.
  pub fn shutdown_sender(&self) -> watch::Sender<bool> {
    self.shutdown_tx.clone()
  }

  /// Address the listener is bound to.
  pub fn local_addr(&self) -> SocketAddr {
    self.local_addr
  }
}

/// Bind `host:port`. Nothing is accepted until [`start`] runs.
pub async fn bind(host: &str, port: u16) -> io::Result<TcpListener> {
  TcpListener::bind((host, port)).await
}

/// Start the accept loop on `listener`, serving `routes` over HTTP/1.1.
pub fn start(listener: TcpListener, routes: Arc<Routes>) -> io::Result<ServerHandle> {
  let local_addr = listener.local_addr()?;
  let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

  info!(event = "server_started", addr = %local_addr, "server started");

  let task = tokio::spawn(async move {
    loop {
      tokio::select! {
        changed = shutdown_rx.changed() => {
          if changed.is_err() || *shutdown_rx.borrow() {
            info!(event = "server_shutdown", "shutdown signal received; stopping accept loop");
            break;
          }
        }
        res = listener.accept() => {
          match res {
            Ok((stream, peer)) => {
              let routes = routes.clone();
              tokio::spawn(async move {
                let svc = service_fn(move |req| routes::handle(routes.clone(), req));
                if let Err(e) = http1::Builder::new()
                  .serve_connection(TokioIo::new(stream), svc)
                  .await
                {
                  debug!(event = "connection_error", peer = %peer, error = %e);
                }
              });
            }
            Err(e) => {
              error!(event = "accept_error", error = %e, "accept error");
              break;
            }
          }
        }
      }
    }
    info!(event = "server_stopped", addr = %local_addr, "server stopped");
  });

  Ok(ServerHandle {
    task,
    local_addr,
    shutdown_tx,
  })
}
