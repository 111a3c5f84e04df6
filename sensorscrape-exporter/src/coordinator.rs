//! Acquisition rounds: one broker session per configured pair.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use sensorscrape_common::{AcquisitionError, Broker, MeasurementPair, SharedReadingStore};

use crate::session::BrokerSession;

/// How the sessions of one round are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// All pairs at once; a round takes about as long as its slowest pair.
    #[default]
    Concurrent,
    /// One pair after another, in configuration order.
    Sequential,
}

/// Result of one pair within a round.
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    pub pair: MeasurementPair,
    pub result: Result<String, AcquisitionError>,
}

impl PairOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of one acquisition round. Observability only: readings are
/// served from the store, not from the report.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub outcomes: Vec<PairOutcome>,
    pub elapsed: Duration,
}

impl RoundReport {
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    /// Outcome for the pair stored under `key`.
    pub fn outcome(&self, key: &str) -> Option<&PairOutcome> {
        self.outcomes.iter().find(|o| o.pair.key == key)
    }
}

/// Cumulative coordinator statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Rounds completed.
    pub rounds: u64,
    /// Pairs that delivered a fresh reading.
    pub acquisitions_ok: u64,
    /// Pairs that could not reach the broker.
    pub connection_errors: u64,
    /// Pairs that saw no message in time.
    pub timeouts: u64,
    /// Pairs whose payload was not a number.
    pub decode_errors: u64,
    /// Pairs that failed at the protocol level.
    pub broker_errors: u64,
    /// Pairs whose key is not in the store.
    pub unknown_keys: u64,
}

impl CoordinatorStats {
    pub fn acquisitions_failed(&self) -> u64 {
        self.connection_errors
            + self.timeouts
            + self.decode_errors
            + self.broker_errors
            + self.unknown_keys
    }

    fn record(&mut self, report: &RoundReport) {
        self.rounds += 1;
        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(_) => self.acquisitions_ok += 1,
                Err(AcquisitionError::Connection(_)) => self.connection_errors += 1,
                Err(AcquisitionError::Timeout(_)) => self.timeouts += 1,
                Err(AcquisitionError::Decode(_)) => self.decode_errors += 1,
                Err(AcquisitionError::Broker(_)) => self.broker_errors += 1,
                Err(AcquisitionError::UnknownKey(_)) => self.unknown_keys += 1,
            }
        }
    }
}

/// Runs acquisition rounds against a broker and records into the store.
pub struct AcquisitionCoordinator<B: Broker> {
    broker: B,
    store: SharedReadingStore,
    mode: AcquisitionMode,
    stats: RwLock<CoordinatorStats>,
}

impl<B: Broker> AcquisitionCoordinator<B> {
    pub fn new(broker: B, store: SharedReadingStore, mode: AcquisitionMode) -> Self {
        Self {
            broker,
            store,
            mode,
            stats: RwLock::new(CoordinatorStats::default()),
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn store(&self) -> &SharedReadingStore {
        &self.store
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// Get coordinator statistics.
    pub fn stats(&self) -> CoordinatorStats {
        self.stats.read().clone()
    }

    /// Attempt every pair once, each waiting at most `timeout` for its
    /// message. A failing pair never prevents the others from running, and
    /// the round always finishes.
    pub async fn run_round(&self, pairs: &[MeasurementPair], timeout: Duration) -> RoundReport {
        let started = Instant::now();

        let outcomes = match self.mode {
            AcquisitionMode::Concurrent => {
                join_all(pairs.iter().map(|pair| self.acquire(pair, timeout))).await
            }
            AcquisitionMode::Sequential => {
                let mut outcomes = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    outcomes.push(self.acquire(pair, timeout).await);
                }
                outcomes
            }
        };

        let report = RoundReport {
            outcomes,
            elapsed: started.elapsed(),
        };

        self.stats.write().record(&report);

        debug!(
            pairs = pairs.len(),
            successes = report.successes(),
            failures = report.failures(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Acquisition round complete"
        );

        report
    }

    async fn acquire(&self, pair: &MeasurementPair, timeout: Duration) -> PairOutcome {
        let mut session = BrokerSession::new(&self.broker, &self.store);
        let result = session.acquire_one(&pair.topic, &pair.key, timeout).await;

        if let Err(e) = &result {
            warn!(
                topic = %pair.topic,
                key = %pair.key,
                kind = e.kind(),
                error = %e,
                "Acquisition failed, keeping previous value"
            );
        }

        PairOutcome {
            pair: pair.clone(),
            result,
        }
    }
}

/// Create a shareable coordinator handle.
pub type SharedCoordinator<B> = Arc<AcquisitionCoordinator<B>>;
