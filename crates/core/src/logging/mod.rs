use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use crate::config::{LogFormat, LogLevel, LoggingConfig};
use tracing::{info, subscriber::set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Flushes buffered log lines when dropped. Hold it until the process exits.
#[must_use = "dropping the guard stops log output"]
pub struct LogGuard {
  _guards: Vec<WorkerGuard>,
}

fn level_filter(level: LogLevel) -> &'static str {
  match level {
    LogLevel::Off => "off",
    LogLevel::Error => "error",
    LogLevel::Warn => "warn",
    LogLevel::Info => "info",
    LogLevel::Debug => "debug",
    LogLevel::Trace => "trace",
  }
}

fn json_layer<W>(writer: W) -> BoxedLayer
where
  W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
  fmt::layer()
    .with_timer(ChronoUtc::rfc_3339())
    .json()
    .with_current_span(true)
    .with_span_list(true)
    .with_level(true)
    .with_target(false)
    .with_thread_ids(false)
    .with_thread_names(false)
    .with_writer(writer)
    .boxed()
}

/// Initialize logging to stderr, plus a JSON lines file when configured.
///
/// `RUST_LOG` overrides `level` when set. A second call keeps the first
/// subscriber; `set_global_default` errors are ignored.
pub fn init(level: LogLevel, logging: &LoggingConfig) -> io::Result<LogGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_filter(level)));

  let mut guards = Vec::new();
  let mut layers: Vec<BoxedLayer> = Vec::new();

  let (stderr_writer, guard) = tracing_appender::non_blocking(io::stderr());
  guards.push(guard);
  layers.push(match logging.format {
    LogFormat::Json => json_layer(stderr_writer),
    LogFormat::Text => fmt::layer()
      .with_timer(ChronoUtc::rfc_3339())
      .with_target(false)
      .with_writer(stderr_writer)
      .boxed(),
  });

  if let Some(path) = logging.file.as_deref() {
    let path = Path::new(path);
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);
    guards.push(guard);
    layers.push(json_layer(file_writer));
  }

  let subscriber = Registry::default().with(layers).with(filter);
  // Ignore error if already set
  let _ = set_global_default(subscriber);

  info!(
    event = "logging_initialized",
    level = ?level,
    format = ?logging.format,
    file = logging.file.as_deref().unwrap_or("-"),
    "logging initialized"
  );
  Ok(LogGuard { _guards: guards })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::Value;
  use std::{fs, thread, time::Duration};
  use tracing::info;

  #[test]
  fn maps_every_level() {
    assert_eq!(level_filter(LogLevel::Off), "off");
    assert_eq!(level_filter(LogLevel::Error), "error");
    assert_eq!(level_filter(LogLevel::Trace), "trace");
  }

  #[test]
  fn writes_json_logs() {
    let td = tempfile::tempdir().unwrap();
    let log = td.path().join("nested").join("beacon.jsonl");
    let cfg = LoggingConfig {
      format: LogFormat::Text,
      file: Some(log.display().to_string()),
    };

    let guard = temp_env::with_var_unset("RUST_LOG", || init(LogLevel::Info, &cfg)).unwrap();
    info!(answer = 42, "hello world");

    // Allow background worker to flush
    thread::sleep(Duration::from_millis(50));
    drop(guard);

    let s = fs::read_to_string(&log).expect("read logs");
    assert!(s.lines().count() >= 1, "no log lines written");

    let mut saw_init = false;
    let mut saw_event = false;
    for line in s.lines() {
      if let Ok(v) = serde_json::from_str::<Value>(line) {
        assert!(v.get("timestamp").is_some());
        assert!(v.get("level").is_some());
        let fields = v.get("fields");
        if fields.and_then(|f| f.get("event")).and_then(|e| e.as_str()) == Some("logging_initialized") {
          saw_init = true;
        }
        if fields.and_then(|f| f.get("message")).and_then(|m| m.as_str()) == Some("hello world") {
          saw_event = true;
        }
      }
    }
    assert!(saw_init, "missing logging_initialized event");
    assert!(saw_event, "missing hello world event");
  }
}
