//! Configuration loading, validation, and management for Council.
//!
//! Loads configuration from `~/.council/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.council/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Council server connection
    #[serde(default)]
    pub server: ServerConfig,

    /// Streaming and frame pacing
    #[serde(default)]
    pub stream: StreamConfig,

    /// Terminal rendering
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for list/get/create requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Longest tolerated silence on an open event stream
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8001".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_stream_idle_timeout() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            stream_idle_timeout_secs: default_stream_idle_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Interval between rendering opportunities (one flush at most per frame)
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,

    /// Capacity of the transport → driver event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_frame_interval() -> u64 {
    16
}
fn default_event_buffer() -> usize {
    64
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl StreamConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Render stage 1 and 2 details, not only the final answer
    #[serde(default = "default_true")]
    pub show_stage_details: bool,

    /// Show model names instead of anonymous ranking labels
    #[serde(default = "default_true")]
    pub deanonymize: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_stage_details: true,
            deanonymize: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.council/config.toml).
    ///
    /// Environment overrides:
    /// - `COUNCIL_SERVER_URL`
    /// - `COUNCIL_FRAME_INTERVAL_MS`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides and validate.
    pub fn load_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("COUNCIL_SERVER_URL") {
            self.server.base_url = url;
        }

        if let Some(raw) = lookup("COUNCIL_FRAME_INTERVAL_MS") {
            self.stream.frame_interval_ms = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "COUNCIL_FRAME_INTERVAL_MS must be an integer, got '{raw}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".council")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.base_url must not be empty".into(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "server.base_url must start with http:// or https://, got '{url}'"
            )));
        }

        if !(1..=1000).contains(&self.stream.frame_interval_ms) {
            return Err(ConfigError::ValidationError(
                "stream.frame_interval_ms must be between 1 and 1000".into(),
            ));
        }

        if self.stream.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "stream.event_buffer must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
