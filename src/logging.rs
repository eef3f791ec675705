//! Tracing setup.
//!
//! The terminal belongs to the UI, so log lines go to a daily rolling file in
//! the platform data directory instead of stderr.

use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "codebook=info";

/// Directory log files are written to
pub fn log_dir() -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(std::env::temp_dir)
    .join("codebook")
}

/// Install the global subscriber. Keep the returned guard alive until exit so
/// buffered lines are flushed.
pub fn init() -> Result<WorkerGuard> {
  let dir = log_dir();
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "codebook.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  // RUST_LOG wins when set and valid
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
  let fmt_layer = tracing_subscriber::fmt::layer()
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true);

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
