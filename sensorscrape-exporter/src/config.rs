//! Configuration for the scrape exporter.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use sensorscrape_common::{
    BrokerConfig, LoggingConfig, MeasurementPair, load_config, pair_up, parse_config,
};

use crate::coordinator::AcquisitionMode;
use crate::mapping::{is_valid_label_name, is_valid_metric_name};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sensorscrape_common::Error> for ConfigError {
    fn from(e: sensorscrape_common::Error) -> Self {
        match e {
            sensorscrape_common::Error::Io(e) => ConfigError::Io(e),
            sensorscrape_common::Error::Parse(e) => ConfigError::Parse(e),
            sensorscrape_common::Error::Config(msg) => ConfigError::Validation(msg),
        }
    }
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Broker connection settings.
    pub broker: BrokerConfig,

    /// Topic/key pairing.
    pub measurements: MeasurementConfig,

    /// Per-round acquisition settings.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Published series.
    #[serde(default = "default_series")]
    pub series: Vec<SeriesConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ordered topics and the keys they are stored under (`topics[i]` ↔ `keys[i]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub topics: Vec<String>,
    pub keys: Vec<String>,
}

/// Acquisition round settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// How long each session waits for its message (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether sessions of a round run concurrently or one after another.
    #[serde(default)]
    pub mode: AcquisitionMode,

    /// Value every key holds until its first successful acquisition.
    #[serde(default = "default_value")]
    pub default_value: String,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_value() -> String {
    "0".to_string()
}

impl AcquisitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            mode: AcquisitionMode::default(),
            default_value: default_value(),
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:5000").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// One published gauge, sourced from a reading store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesConfig {
    /// Metric name.
    pub name: String,

    /// `# HELP` text.
    #[serde(default)]
    pub help: String,

    /// Reading store key the value comes from.
    pub key: String,

    /// Constant labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_series() -> Vec<SeriesConfig> {
    let home = BTreeMap::from([("room".to_string(), "home".to_string())]);
    vec![
        SeriesConfig {
            name: "current_temperature".to_string(),
            help: "the current temperature in degree celcius".to_string(),
            key: "temp".to_string(),
            labels: home.clone(),
        },
        SeriesConfig {
            name: "current_humidity".to_string(),
            help: "the current humidity as percentage".to_string(),
            key: "humidity".to_string(),
            labels: home,
        },
    ]
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The configured topic/key pairs, in order.
    pub fn pairs(&self) -> Result<Vec<MeasurementPair>, ConfigError> {
        Ok(pair_up(&self.measurements.topics, &self.measurements.keys)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.validate()?;
        let pairs = self.pairs()?;

        if self.acquisition.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "acquisition timeout_ms must be > 0".to_string(),
            ));
        }

        if self.acquisition.default_value.trim().parse::<f64>().is_err() {
            return Err(ConfigError::Validation(format!(
                "default_value '{}' is not a number",
                self.acquisition.default_value
            )));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        self.validate_series(&pairs)
    }

    fn validate_series(&self, pairs: &[MeasurementPair]) -> Result<(), ConfigError> {
        if self.series.is_empty() {
            return Err(ConfigError::Validation(
                "at least one series is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for series in &self.series {
            if !is_valid_metric_name(&series.name) {
                return Err(ConfigError::Validation(format!(
                    "Invalid metric name: {}",
                    series.name
                )));
            }
            if !names.insert(series.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate series name: {}",
                    series.name
                )));
            }
            if let Some(label) = series.labels.keys().find(|l| !is_valid_label_name(l)) {
                return Err(ConfigError::Validation(format!(
                    "Invalid label name '{}' on series {}",
                    label, series.name
                )));
            }
            if !pairs.iter().any(|p| p.key == series.key) {
                return Err(ConfigError::Validation(format!(
                    "Series {} reads unknown measurement key '{}'",
                    series.name, series.key
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        broker: { host: "broker.local", username: "sensor", password: "secret" },
        measurements: {
            topics: ["sensors/home/temp", "sensors/home/humidity"],
            keys: ["temp", "humidity"],
        },
    }"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse(MINIMAL).unwrap();

        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.prometheus.listen, "0.0.0.0:5000");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.acquisition.timeout(), Duration::from_secs(5));
        assert_eq!(config.acquisition.mode, AcquisitionMode::Concurrent);
        assert_eq!(config.acquisition.default_value, "0");
        assert_eq!(config.series.len(), 2);
        assert_eq!(config.series[0].name, "current_temperature");
        assert_eq!(config.series[1].key, "humidity");
        assert_eq!(
            config.pairs().unwrap(),
            vec![
                MeasurementPair::new("sensors/home/temp", "temp"),
                MeasurementPair::new("sensors/home/humidity", "humidity"),
            ]
        );
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            broker: {
                host: "10.0.0.5",
                port: 1884,
                username: "sensor",
                password: "secret",
                client_id_prefix: "scraper",
                connect_timeout_ms: 1000,
            },
            measurements: {
                topics: ["garden/pressure"],
                keys: ["pressure"],
            },
            acquisition: {
                timeout_ms: 750,
                mode: "sequential",
                default_value: "-1",
            },
            prometheus: {
                listen: "127.0.0.1:9100",
                path: "/garden/metrics",
            },
            series: [
                { name: "garden_pressure_hpa", help: "air pressure", key: "pressure",
                  labels: { room: "garden" } },
            ],
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.broker.host, "10.0.0.5");
        assert_eq!(config.broker.client_id_prefix, "scraper");
        assert_eq!(config.acquisition.timeout(), Duration::from_millis(750));
        assert_eq!(config.acquisition.mode, AcquisitionMode::Sequential);
        assert_eq!(config.acquisition.default_value, "-1");
        assert_eq!(config.prometheus.listen, "127.0.0.1:9100");
        assert_eq!(config.series[0].labels.get("room"), Some(&"garden".to_string()));
        assert_eq!(
            config.logging.format,
            sensorscrape_common::LogFormat::Json
        );
    }

    #[test]
    fn test_missing_measurements_rejected() {
        let json = r#"{
            broker: { username: "sensor", password: "secret" },
        }"#;

        assert!(matches!(
            ExporterConfig::parse(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let json = r#"{
            broker: { host: "broker.local" },
            measurements: { topics: ["a"], keys: ["temp"] },
        }"#;

        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_mismatched_pairing_rejected() {
        let json = r#"{
            broker: { username: "sensor", password: "secret" },
            measurements: { topics: ["a", "b"], keys: ["temp"] },
        }"#;

        let err = ExporterConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("same length"));
    }

    #[test]
    fn test_series_with_unknown_key_rejected() {
        // Default series need "humidity", which is not configured here.
        let json = r#"{
            broker: { username: "sensor", password: "secret" },
            measurements: { topics: ["sensors/home/temp"], keys: ["temp"] },
        }"#;

        let err = ExporterConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("unknown measurement key 'humidity'"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            broker: { username: "sensor", password: "secret" },
            measurements: { topics: ["a", "b"], keys: ["temp", "humidity"] },
            prometheus: { listen: "not-an-address" }
        }"#;

        let err = ExporterConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            broker: { username: "sensor", password: "secret" },
            measurements: { topics: ["a", "b"], keys: ["temp", "humidity"] },
            prometheus: { path: "no-leading-slash" }
        }"#;

        let err = ExporterConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("must start with /"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let json = r#"{
            broker: { username: "sensor", password: "secret" },
            measurements: { topics: ["a", "b"], keys: ["temp", "humidity"] },
            acquisition: { timeout_ms: 0 }
        }"#;

        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_non_numeric_default() {
        let json = r#"{
            broker: { username: "sensor", password: "secret" },
            measurements: { topics: ["a", "b"], keys: ["temp", "humidity"] },
            acquisition: { default_value: "unknown" }
        }"#;

        let err = ExporterConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn test_validate_bad_series_name() {
        let json = r#"{
            broker: { username: "sensor", password: "secret" },
            measurements: { topics: ["a"], keys: ["temp"] },
            series: [ { name: "1st-temp", key: "temp" } ]
        }"#;

        let err = ExporterConfig::parse(json).unwrap_err();
        assert!(err.to_string().contains("Invalid metric name"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensorscrape.json5");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = ExporterConfig::load_from_file(&path).unwrap();
        assert_eq!(config.broker.host, "broker.local");
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExporterConfig::load_from_file("/nonexistent/sensorscrape.json5");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = ExporterConfig::parse(include_str!("../../sensorscrape.json5")).unwrap();

        assert_eq!(config.pairs().unwrap().len(), 2);
        assert_eq!(config.series, default_series());
        assert_eq!(config.prometheus.listen, "0.0.0.0:5000");
    }
}
