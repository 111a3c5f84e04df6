//! Periodic refresh of every reading, without an HTTP listener.

use std::time::Duration;

use sensorscrape_common::Broker;
use tokio::sync::watch;
use tracing::info;

use crate::exposition::{ExpositionAdapter, SharedAdapter};

/// One key's value after a watch round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedReading {
    pub key: String,
    pub topic: String,
    pub value: String,
    /// Whether this round delivered the value.
    pub fresh: bool,
}

/// Refresh every pair once and log the resulting readings in pair order.
pub async fn watch_round<B: Broker>(adapter: &ExpositionAdapter<B>) -> Vec<WatchedReading> {
    let report = adapter.refresh().await;

    adapter
        .pairs()
        .iter()
        .map(|pair| {
            let reading = WatchedReading {
                key: pair.key.clone(),
                topic: pair.topic.clone(),
                value: adapter.store().get(&pair.key),
                fresh: report
                    .outcome(&pair.key)
                    .is_some_and(|outcome| outcome.is_success()),
            };
            info!(
                key = %reading.key,
                topic = %reading.topic,
                value = %reading.value,
                fresh = reading.fresh,
                "Reading"
            );
            reading
        })
        .collect()
}

/// Run a watch round, pause for `interval`, repeat until shutdown.
///
/// Returns the number of rounds run.
pub async fn watch_loop<B: Broker>(
    adapter: SharedAdapter<B>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    info!(interval_secs = interval.as_secs(), "Watching readings");

    let mut rounds = 0;
    loop {
        watch_round(&adapter).await;
        rounds += 1;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(rounds, "Watch stopped");
    rounds
}
