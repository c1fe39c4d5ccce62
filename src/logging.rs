// ABOUTME: Structured logging setup using tracing-subscriber and tracing-appender
// ABOUTME: Pretty or JSON console output, plus optional daily-rolling JSON files

use anyhow::{Context, Result};
use slink_core::config::{LogFormat, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file prefix inside `logging.directory`
const LOG_FILE_PREFIX: &str = "slink.log";

/// Keeps the file writer alive; dropping it flushes pending entries.
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

/// `RUST_LOG` wins over the configured filter
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .with_context(|| format!("Invalid logging.filter: {}", config.filter)),
    }
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = env_filter(config)?;

    let (pretty_layer, json_layer) = match config.format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard { _guard: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            filter: "slink=notalevel".to_string(),
            ..Default::default()
        };
        assert!(env_filter(&config).is_err());
    }
}
