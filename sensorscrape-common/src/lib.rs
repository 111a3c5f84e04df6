//! sensorscrape Common Library
//!
//! This crate provides the shared pieces of the sensorscrape bridge:
//!
//! - [`measurement`] - Topic/key pairing (`MeasurementPair`)
//! - [`store`] - Last-known-value table (`ReadingStore`)
//! - [`broker`] - Broker capability traits and `AcquisitionError`
//! - [`mqtt`] - MQTT implementation of the broker capability
//! - [`mock`] - Scripted in-memory broker for tests
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod broker;
pub mod config;
pub mod error;
pub mod measurement;
pub mod mock;
pub mod mqtt;
pub mod store;

// Re-export commonly used types at the crate root
pub use broker::{AcquisitionError, Broker, BrokerConnection};
pub use config::{BrokerConfig, LogFormat, LoggingConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use measurement::{MeasurementPair, pair_up};
pub use mock::{MockBroker, Script};
pub use mqtt::{MqttBroker, MqttConnection};
pub use store::{ReadingStore, SharedReadingStore};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// # Example
///
/// ```ignore
/// use sensorscrape_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
