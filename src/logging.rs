//! Log file setup. Stdout carries command output, so logs go to a file.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const LOG_ENV: &str = "CASSIST_LOG";
const DEFAULT_FILTER: &str = "info";

/// Directory holding the daily log files
pub fn log_dir() -> Result<PathBuf> {
  dirs::data_dir()
    .map(|d| d.join("cassist").join("logs"))
    .ok_or_else(|| eyre!("Could not determine data directory for logs"))
}

fn filter(config: &Config) -> Result<EnvFilter> {
  let directives = std::env::var(LOG_ENV)
    .ok()
    .or_else(|| config.log_level.clone())
    .unwrap_or_else(|| DEFAULT_FILTER.to_string());

  EnvFilter::try_new(&directives).map_err(|e| eyre!("Invalid log filter '{}': {}", directives, e))
}

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(config: &Config) -> Result<WorkerGuard> {
  let dir = log_dir()?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "cassist.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter(config)?)
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_filter_from_config() {
    let mut config = Config::parse("supabase:\n  url: https://abc.supabase.co\n").unwrap();
    config.log_level = Some("cassist=debug".to_string());
    if std::env::var(LOG_ENV).is_err() {
      assert!(filter(&config).is_ok());
    }
  }

  #[test]
  fn test_invalid_filter_rejected() {
    let mut config = Config::parse("supabase:\n  url: https://abc.supabase.co\n").unwrap();
    config.log_level = Some("cassist=notalevel".to_string());
    if std::env::var(LOG_ENV).is_err() {
      assert!(filter(&config).is_err());
    }
  }
}
