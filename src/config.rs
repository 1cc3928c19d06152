//! Service configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables (a `.env` file in the working directory is honoured). Every
//! section and key has a default, so an empty file is a valid config.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const ENV_API_URL: &str = "AQI_API_URL";
pub const ENV_API_TOKEN: &str = "AQI_API_TOKEN";
pub const ENV_DEVICE_ID: &str = "AQI_DEVICE_ID";
pub const ENV_LOG_LEVEL: &str = "AQI_LOG_LEVEL";

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend base URL including the `/api` prefix.
    pub base_url: String,
    /// Bearer token (JWT). Without it the alert stream is never opened.
    pub token: Option<String>,
    /// Timeout for the short preference/telemetry requests. The alert
    /// stream itself is long-lived and never times out.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            token: None,
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub preferences_interval_secs: u64,
    pub telemetry_interval_secs: u64,
    /// Station whose current AQI feeds the instantaneous rule. Unset
    /// disables the current-AQI poller.
    pub device_id: Option<String>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            preferences_interval_secs: 10,
            telemetry_interval_secs: 60,
            device_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Reopen an alert stream that has ended when a later preference poll
    /// still asks for immediate alerts. Off keeps one stream per activation.
    pub reopen_finished_stream: bool,
    /// Capacity of the event queue between producers and the evaluator.
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reopen_finished_stream: false,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Io { path: String, message: String },
    /// The config file is not valid TOML for this schema.
    Parse(String),
    /// A value is present but unusable.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, message } => write!(f, "Cannot read config {}: {}", path, message),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl ServiceConfig {
    /// Load the config file (if given), apply `.env` and process environment
    /// overrides, and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay environment values. `lookup` is injected so tests never touch
    /// the real process environment. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = non_empty(ENV_API_TOKEN) {
            self.api.token = Some(token);
        }
        if let Some(device) = non_empty(ENV_DEVICE_ID) {
            self.polling.device_id = Some(device);
        }
        if let Some(level) = non_empty(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
        }
        if self.polling.preferences_interval_secs == 0 {
            return Err(ConfigError::Invalid("polling.preferences_interval_secs must be > 0".into()));
        }
        if self.polling.telemetry_interval_secs == 0 {
            return Err(ConfigError::Invalid("polling.telemetry_interval_secs must be > 0".into()));
        }
        if self.stream.queue_capacity == 0 {
            return Err(ConfigError::Invalid("stream.queue_capacity must be > 0".into()));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.request_timeout_secs must be > 0".into()));
        }
        if let Err(e) = self.logging.level.parse::<crate::logging::LogLevel>() {
            return Err(ConfigError::Invalid(format!("logging.level: {}", e)));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
