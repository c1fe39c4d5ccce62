// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates tokens and provides sensible defaults for optional sections
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::traits::Credential;

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot OAuth token (xoxb-...) for Web API calls
    #[serde(default)]
    pub bot_token: String,
    /// App-level token (xapp-...) for Socket Mode connections
    #[serde(default)]
    pub app_token: String,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("app_token", &redact(&self.app_token))
            .finish()
    }
}

fn redact(token: &str) -> &'static str {
    if token.is_empty() {
        "[EMPTY]"
    } else {
        "[REDACTED]"
    }
}

impl SlackConfig {
    pub fn credential(&self) -> Credential {
        Credential {
            bot_token: self.bot_token.clone(),
            app_token: self.app_token.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Protocol tag placed on every channel descriptor
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Capacity of the inbound event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_protocol() -> String {
    "slack".to_string()
}

fn default_event_buffer() -> usize {
    256
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Unknown log format: {} (expected pretty or json)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// EnvFilter directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
            directory: None,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus listen address (e.g., "127.0.0.1:9100"); disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,
}

impl MetricsConfig {
    pub fn socket_addr(&self) -> Result<Option<SocketAddr>> {
        self.listen_addr
            .as_deref()
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .with_context(|| format!("metrics.listen_addr is not a socket address: {}", addr))
            })
            .transpose()
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error; everything can come from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content).context("Invalid configuration TOML")
    }

    /// Override fields from environment variables if present
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SLACK_BOT_TOKEN") {
            self.slack.bot_token = val;
        }
        if let Ok(val) = std::env::var("SLACK_APP_TOKEN") {
            self.slack.app_token = val;
        }
        if let Ok(val) = std::env::var("SLINK_PROTOCOL") {
            self.adapter.protocol = val;
        }
        if let Ok(val) = std::env::var("SLINK_LOG_FORMAT") {
            self.logging.format = val
                .parse()
                .with_context(|| format!("SLINK_LOG_FORMAT is invalid: {}", val))?;
        }
        if let Ok(val) = std::env::var("SLINK_LOG_FILTER") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("SLINK_LOG_DIR") {
            self.logging.directory = Some(val);
        }
        if let Ok(val) = std::env::var("SLINK_METRICS_ADDR") {
            self.metrics.listen_addr = Some(val);
        }
        Ok(())
    }

    /// Validate required fields
    pub fn validate(&self) -> Result<()> {
        let bot_token = self.slack.bot_token.trim();
        if bot_token.is_empty() {
            anyhow::bail!("slack.bot_token is required (set in config.toml or SLACK_BOT_TOKEN env var)");
        }
        if !bot_token.starts_with("xoxb-") && !bot_token.starts_with("xoxp-") {
            anyhow::bail!("slack.bot_token must be a bot (xoxb-) or user (xoxp-) token");
        }

        let app_token = self.slack.app_token.trim();
        if app_token.is_empty() {
            anyhow::bail!("slack.app_token is required (set in config.toml or SLACK_APP_TOKEN env var)");
        }
        if !app_token.starts_with("xapp-") {
            anyhow::bail!("slack.app_token must be an app-level token (xapp-)");
        }

        if self.adapter.protocol.trim().is_empty() {
            anyhow::bail!("adapter.protocol must not be empty");
        }
        if self.adapter.event_buffer == 0 {
            anyhow::bail!("adapter.event_buffer must be at least 1");
        }

        self.metrics.socket_addr()?;
        Ok(())
    }
}
