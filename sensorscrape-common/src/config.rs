use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// MQTT broker connection settings.
///
/// Credentials have no defaults: a configuration without them is rejected
/// when it is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker hostname or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username sent in CONNECT.
    pub username: String,

    /// Password sent in CONNECT.
    pub password: String,

    /// Prefix for the per-connection client id (`{prefix}-{uuid}`).
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// How long to wait for the broker's CONNACK.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id_prefix() -> String {
    "sensorscrape".to_string()
}

fn default_keep_alive() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5000
}

impl BrokerConfig {
    /// Create a broker configuration with default tuning values.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            client_id_prefix: default_client_id_prefix(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Validate the broker settings.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("broker host must not be empty".to_string()));
        }
        if self.username.is_empty() {
            return Err(Error::Config(
                "broker username must not be empty".to_string(),
            ));
        }
        if self.client_id_prefix.trim().is_empty() {
            return Err(Error::Config(
                "client_id_prefix must not be empty".to_string(),
            ));
        }
        if self.keep_alive_secs == 0 {
            return Err(Error::Config("keep_alive_secs must be > 0".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    Ok(json5::from_str(content)?)
}
