//! Prometheus scrape endpoint for MQTT sensor readings.
//!
//! Every scrape runs one acquisition round: for each configured topic/key
//! pair a fresh broker connection is opened, the first message on the topic
//! is stored, and the connection is closed again. The store is then rendered
//! in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ MQTT broker  │────>│   Coordinator    │────>│ HTTP server  │
//! │ (one session │     │ (round per scrape│     │  (/metrics)  │
//! │  per pair)   │     │  + ReadingStore) │     │              │
//! └──────────────┘     └──────────────────┘     └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! sensorscrape-exporter --config sensorscrape.json5
//! sensorscrape-exporter --config sensorscrape.json5 watch --interval-secs 3
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod coordinator;
pub mod exposition;
pub mod http;
pub mod mapping;
pub mod session;
pub mod watch;

pub use config::ExporterConfig;
pub use coordinator::{
    AcquisitionCoordinator, AcquisitionMode, CoordinatorStats, PairOutcome, RoundReport,
    SharedCoordinator,
};
pub use exposition::{CONTENT_TYPE, ExpositionAdapter, SeriesSpec, SharedAdapter};
pub use http::HttpServer;
pub use session::{BrokerSession, SessionState};
pub use watch::{WatchedReading, watch_loop, watch_round};
