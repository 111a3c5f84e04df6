use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A broker topic bound to the measurement key its readings are stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementPair {
    /// Broker-side subscription path (e.g. "sensors/home/temp").
    pub topic: String,

    /// Reading store key (e.g. "temp").
    pub key: String,
}

impl MeasurementPair {
    pub fn new(topic: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for MeasurementPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.topic, self.key)
    }
}

/// Pair `topics[i]` with `keys[i]`.
///
/// Fails unless both lists are non-empty, of equal length, free of blank
/// entries, and the keys are unique.
pub fn pair_up<T, K>(topics: &[T], keys: &[K]) -> Result<Vec<MeasurementPair>>
where
    T: AsRef<str>,
    K: AsRef<str>,
{
    if topics.len() != keys.len() {
        return Err(Error::Config(format!(
            "topics and keys must have the same length ({} topics, {} keys)",
            topics.len(),
            keys.len()
        )));
    }
    if topics.is_empty() {
        return Err(Error::Config(
            "at least one topic/key pair is required".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(keys.len());
    let mut pairs = Vec::with_capacity(keys.len());

    for (index, (topic, key)) in topics.iter().zip(keys).enumerate() {
        let topic = topic.as_ref().trim();
        let key = key.as_ref().trim();

        if topic.is_empty() {
            return Err(Error::Config(format!("topic #{} is empty", index)));
        }
        if key.is_empty() {
            return Err(Error::Config(format!("key #{} is empty", index)));
        }
        if !seen.insert(key.to_string()) {
            return Err(Error::Config(format!("duplicate measurement key '{}'", key)));
        }

        pairs.push(MeasurementPair::new(topic, key));
    }

    Ok(pairs)
}
