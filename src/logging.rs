//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;

const LOG_FILE_PREFIX: &str = "tablecache.log";

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr, and also to a
/// daily-rolling file when enabled; keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(&config.level)
      .map_err(|e| eyre!("Invalid log level '{}': {}", config.level, e))?,
  };

  let stderr = fmt::layer().with_writer(std::io::stderr);

  if !config.file {
    tracing_subscriber::registry()
      .with(filter)
      .with(stderr)
      .try_init()?;
    return Ok(None);
  }

  let dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("tablecache")
    .join("logs");
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
    &dir,
    LOG_FILE_PREFIX,
  ));

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr)
    .with(fmt::layer().with_ansi(false).with_writer(writer))
    .try_init()?;

  Ok(Some(guard))
}
