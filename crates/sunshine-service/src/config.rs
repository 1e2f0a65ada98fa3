//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sunshine_core::{ClientConfig, DEFAULT_BASE_URL, MAX_FORECAST_DAYS, MIN_FORECAST_DAYS};
use sunshine_types::Units;

/// Environment variable consulted when `api.key` is not set.
pub const API_KEY_ENV: &str = "SUNSHINE_API_KEY";

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Sync settings.
    pub sync: SyncConfig,
    /// Forecast provider settings.
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// # Example
    ///
    /// ```
    /// use sunshine_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.sync.validate());
        errors.extend(self.api.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
    /// Capacity of the store change broadcast channel.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            broadcast_buffer: 100,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", port),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError::new(
                "server.broadcast_buffer",
                "broadcast buffer must be at least 1",
            ));
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: sunshine_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Minimum sync interval in seconds (1 minute).
pub const MIN_SYNC_INTERVAL: u64 = 60;
/// Maximum sync interval in seconds (1 day).
pub const MAX_SYNC_INTERVAL: u64 = 86_400;
/// Maximum request timeout in seconds.
pub const MAX_TIMEOUT: u64 = 300;

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Preferred location setting (city name, "city,country", or postal code).
    pub location: String,
    /// Unit system requested from the provider.
    pub units: Units,
    /// Forecast horizon in days.
    pub days: u8,
    /// Seconds between periodic syncs.
    pub interval_secs: u64,
    /// Deadline for one provider request, in seconds.
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            location: "94043".to_string(),
            units: Units::Metric,
            days: 14,
            interval_secs: 3 * 60 * 60,
            timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Periodic sync interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Provider request deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate sync configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.location.trim().is_empty() {
            errors.push(ValidationError::new(
                "sync.location",
                "location cannot be empty",
            ));
        }

        if !(MIN_FORECAST_DAYS..=MAX_FORECAST_DAYS).contains(&self.days) {
            errors.push(ValidationError::new(
                "sync.days",
                format!(
                    "days {} out of range ({}-{})",
                    self.days, MIN_FORECAST_DAYS, MAX_FORECAST_DAYS
                ),
            ));
        }

        if self.interval_secs < MIN_SYNC_INTERVAL {
            errors.push(ValidationError::new(
                "sync.interval_secs",
                format!(
                    "interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_SYNC_INTERVAL
                ),
            ));
        } else if self.interval_secs > MAX_SYNC_INTERVAL {
            errors.push(ValidationError::new(
                "sync.interval_secs",
                format!(
                    "interval {} is too long (maximum {} seconds / 1 day)",
                    self.interval_secs, MAX_SYNC_INTERVAL
                ),
            ));
        }

        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT {
            errors.push(ValidationError::new(
                "sync.timeout_secs",
                format!(
                    "timeout {} out of range (1-{} seconds)",
                    self.timeout_secs, MAX_TIMEOUT
                ),
            ));
        }

        errors
    }
}

/// Forecast provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Provider base URL.
    pub base_url: String,
    /// API key; falls back to the `SUNSHINE_API_KEY` environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            key: None,
        }
    }
}

impl ApiConfig {
    /// The configured key, or the environment fallback. Empty keys count as unset.
    pub fn resolved_key(&self) -> Option<String> {
        self.key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Client settings for the given unit system.
    pub fn client_config(&self, units: Units) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            api_key: self.resolved_key(),
            units,
        }
    }

    /// Validate provider configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError::new(
                "api.base_url",
                format!(
                    "base URL '{}' must start with http:// or https://",
                    self.base_url
                ),
            ));
        }

        if let Some(key) = &self.key
            && key.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "api.key",
                "key cannot be empty string (omit it instead)",
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `sync.days`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sunshine")
        .join("server.toml")
}
