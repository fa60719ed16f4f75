//! Configuration management for Relay.
//!
//! Provides configuration loading from TOML files with support for
//! multiple file locations, environment variable overrides, and sensible defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "RELAY_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the configuration file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as TOML.
    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        /// Path to the configuration file that could not be parsed.
        path: PathBuf,
        /// The underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// LLM provider name ("openai" or "deepseek").
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the provider. Environment variables take priority.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name to use.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override of the provider's API root, e.g. for a local gateway.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Maximum tokens the model may generate per turn.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// System prompt sent ahead of the conversation history.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Streaming settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// File logging settings. Logs go to stderr only when absent.
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

/// Settings of the streaming pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamConfig {
    /// Capacity of the chunk channel between accumulator and orchestrator.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Number of stored messages sent to the model as history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            history_limit: default_history_limit(),
        }
    }
}

/// Rolling log file settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// Directory log files are written to.
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// How often a new log file is started.
    #[serde(default)]
    pub rotation: Rotation,

    /// Number of rotated files kept.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    /// New file every hour.
    Hourly,
    /// New file every day.
    #[default]
    Daily,
    /// A single file, never rotated.
    Never,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_channel_capacity() -> usize {
    10
}

fn default_history_limit() -> usize {
    100
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_max_files() -> usize {
    7
}

impl Config {
    /// Load configuration from file system.
    ///
    /// Priority order:
    /// 1. RELAY_CONFIG environment variable
    /// 2. ./config.toml (local directory)
    /// 3. ~/.config/relay/config.toml (user config)
    ///
    /// Returns default config if no config file found.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if a found file cannot be read.
    /// Returns [`ConfigError::ParseError`] if a found file is not valid TOML.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(path),
            None => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                return Some(p);
            }
        }

        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Some(local);
        }

        dirs::home_dir()
            .map(|home| home.join(".config/relay/config.toml"))
            .filter(|p| p.exists())
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read.
    /// Returns [`ConfigError::ParseError`] if the file is not valid TOML.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model: default_model(),
            base_url: None,
            max_tokens: default_max_tokens(),
            system_prompt: None,
            stream: StreamConfig::default(),
            logging: None,
        }
    }
}
