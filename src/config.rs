//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query service connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_universe")]
    pub universe: String,

    /// Project used when none is given on the command line
    pub project: Option<String>,

    pub token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_universe() -> String {
    "default".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            universe: default_universe(),
            project: None,
            token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("crashq").join("config.toml"))
    }

    /// Load from an explicit path, the default location, or the environment
    ///
    /// An explicit path that fails to load is an error; a broken file at the
    /// default location is logged and skipped.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_with_env(path);
        }

        if let Some(path) = Self::default_path().filter(|p| p.exists()) {
            match Self::load_with_env(&path) {
                Ok(config) => {
                    tracing::debug!("Loaded config from {:?}", path);
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!("Failed to load config from {:?}: {}", path, e);
                }
            }
        }

        Ok(Self::from_env())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Service overrides
        if let Ok(endpoint) = std::env::var("CRASHQ_ENDPOINT") {
            self.service.endpoint = endpoint;
        }
        if let Ok(universe) = std::env::var("CRASHQ_UNIVERSE") {
            self.service.universe = universe;
        }
        if let Ok(token) = std::env::var("CRASHQ_TOKEN") {
            self.service.token = Some(token);
        }

        // Logging overrides
        if let Ok(level) = std::env::var("CRASHQ_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CRASHQ_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# crashq configuration
#
# Environment variables override these settings:
# - CRASHQ_ENDPOINT
# - CRASHQ_UNIVERSE
# - CRASHQ_TOKEN
# - CRASHQ_LOG_LEVEL
# - CRASHQ_LOG_FORMAT

[service]
# Query service base URL
endpoint = "http://localhost:8080"

# Tenant namespace
universe = "default"

# Project used when none is given on the command line
# project = "my-project"

# API token
# token = ""

# Request timeout in seconds
request_timeout_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "warn"

# Log format: pretty or json
format = "pretty"
"#
    .to_string()
}
