//! Configuration for the signaling service
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the signaling service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Liveness sweeper configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Transport limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP + WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Liveness sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Idle time after which an endpoint is evicted
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_inactivity_timeout() -> u64 {
    1800 // 30 minutes
}

/// Largest inactivity timeout representable as a millisecond duration
pub const MAX_INACTIVITY_TIMEOUT_SECS: u64 = (i64::MAX / 1000) as u64;

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            inactivity_timeout_secs: default_inactivity_timeout(),
        }
    }
}

/// Transport limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest WebSocket message accepted from an endpoint
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_max_message_bytes() -> usize {
    1024 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("PHONECAST_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("PHONECAST_PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }

        if let Ok(interval) = std::env::var("PHONECAST_SWEEP_INTERVAL") {
            if let Ok(i) = interval.parse() {
                config.sweeper.interval_secs = i;
            }
        }
        if let Ok(timeout) = std::env::var("PHONECAST_INACTIVITY_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                config.sweeper.inactivity_timeout_secs = t;
            }
        }

        if let Ok(max) = std::env::var("PHONECAST_MAX_MESSAGE_BYTES") {
            if let Ok(m) = max.parse() {
                config.limits.max_message_bytes = m;
            }
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the sweeper cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweeper.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweeper.interval_secs must be at least 1".to_string(),
            ));
        }
        let timeout = self.sweeper.inactivity_timeout_secs;
        if timeout == 0 || timeout > MAX_INACTIVITY_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "sweeper.inactivity_timeout_secs must be between 1 and {}, got {}",
                MAX_INACTIVITY_TIMEOUT_SECS, timeout
            )));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
