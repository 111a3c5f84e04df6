//! Scrape-time refresh and rendering of the published series.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use sensorscrape_common::{Broker, MeasurementPair, SharedReadingStore};

use crate::config::SeriesConfig;
use crate::coordinator::{RoundReport, SharedCoordinator};
use crate::mapping::{escape_help, format_labels, format_value, reading_value};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// A gauge published on every scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpec {
    /// Metric name.
    pub name: String,
    /// `# HELP` text.
    pub help: String,
    /// Reading store key the value comes from.
    pub key: String,
    /// Constant labels, rendered in key order.
    pub labels: BTreeMap<String, String>,
}

impl SeriesSpec {
    pub fn new(name: impl Into<String>, help: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            key: key.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Add a constant label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl From<SeriesConfig> for SeriesSpec {
    fn from(config: SeriesConfig) -> Self {
        Self {
            name: config.name,
            help: config.help,
            key: config.key,
            labels: config.labels,
        }
    }
}

/// Refreshes every pair on each scrape and renders the store.
pub struct ExpositionAdapter<B: Broker> {
    coordinator: SharedCoordinator<B>,
    pairs: Vec<MeasurementPair>,
    timeout: Duration,
    series: Vec<SeriesSpec>,
}

impl<B: Broker> ExpositionAdapter<B> {
    pub fn new(
        coordinator: SharedCoordinator<B>,
        pairs: Vec<MeasurementPair>,
        timeout: Duration,
        series: Vec<SeriesSpec>,
    ) -> Self {
        Self {
            coordinator,
            pairs,
            timeout,
            series,
        }
    }

    pub fn coordinator(&self) -> &SharedCoordinator<B> {
        &self.coordinator
    }

    pub fn pairs(&self) -> &[MeasurementPair] {
        &self.pairs
    }

    pub fn store(&self) -> &SharedReadingStore {
        self.coordinator.store()
    }

    /// Run one acquisition round over every configured pair.
    pub async fn refresh(&self) -> RoundReport {
        self.coordinator.run_round(&self.pairs, self.timeout).await
    }

    /// Refresh, then render. Pair failures only leave stale values behind;
    /// the scrape itself always succeeds.
    pub async fn scrape(&self) -> String {
        self.refresh().await;
        self.render()
    }

    /// Render the current store contents in Prometheus exposition format.
    pub fn render(&self) -> String {
        let store = self.store();
        let mut output = String::with_capacity(self.series.len() * 128);

        for series in &self.series {
            let value = reading_value(&store.get(&series.key));

            writeln!(output, "# HELP {} {}", series.name, escape_help(&series.help)).ok();
            writeln!(output, "# TYPE {} gauge", series.name).ok();
            writeln!(
                output,
                "{}{} {}",
                series.name,
                format_labels(&series.labels),
                format_value(value)
            )
            .ok();
        }

        output
    }
}

/// Create a shareable adapter handle.
pub type SharedAdapter<B> = Arc<ExpositionAdapter<B>>;
