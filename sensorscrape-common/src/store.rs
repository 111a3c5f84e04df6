//! Last-known-value table shared by broker sessions and the scrape endpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

/// Thread-safe mapping from measurement key to the last raw value received.
///
/// Every configured key starts at the default value and is only ever
/// overwritten, never removed. Writers to different keys do not interfere;
/// a reader racing a writer on the same key sees either the old or the new
/// value in full.
#[derive(Debug)]
pub struct ReadingStore {
    readings: RwLock<HashMap<String, String>>,
    default_value: String,
}

impl ReadingStore {
    /// Create a store holding `default_value` for every key.
    pub fn new<I, S>(keys: I, default_value: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default_value = default_value.into();
        let readings = keys
            .into_iter()
            .map(|k| (k.into(), default_value.clone()))
            .collect();

        Self {
            readings: RwLock::new(readings),
            default_value,
        }
    }

    /// Get the current value for `key`.
    ///
    /// Keys that were never written (or are unknown) yield the default.
    pub fn get(&self, key: &str) -> String {
        self.readings
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.default_value.clone())
    }

    /// Overwrite the value for `key`. Last writer wins.
    ///
    /// The key set is fixed at construction; writes to unknown keys are
    /// dropped and reported by returning `false`.
    pub fn set(&self, key: &str, value: impl Into<String>) -> bool {
        let mut readings = self.readings.write();
        match readings.get_mut(key) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => {
                drop(readings);
                warn!(key, "Ignoring write to unknown measurement key");
                false
            }
        }
    }

    /// Whether `key` is one of the configured measurement keys.
    pub fn contains(&self, key: &str) -> bool {
        self.readings.read().contains_key(key)
    }

    /// A consistent copy of every key and value, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.readings
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Create a shareable store handle.
pub type SharedReadingStore = Arc<ReadingStore>;
