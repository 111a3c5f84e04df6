//! One-shot acquisition of a single reading.

use std::fmt;
use std::time::Duration;

use sensorscrape_common::{AcquisitionError, Broker, BrokerConnection, ReadingStore};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Lifecycle of a [`BrokerSession`].
///
/// `Disconnected → Connecting → Subscribed → (MessageReceived | TimedOut |
/// Errored) → Disconnected`. The connection is released on every transition
/// back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribed,
    MessageReceived,
    TimedOut,
    Errored,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Subscribed => "subscribed",
            SessionState::MessageReceived => "message_received",
            SessionState::TimedOut => "timed_out",
            SessionState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Acquires exactly one fresh value for one topic/key pair.
pub struct BrokerSession<'a, B: Broker> {
    broker: &'a B,
    store: &'a ReadingStore,
    state: SessionState,
}

impl<'a, B: Broker> BrokerSession<'a, B> {
    pub fn new(broker: &'a B, store: &'a ReadingStore) -> Self {
        Self {
            broker,
            store,
            state: SessionState::Disconnected,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = %self.state, to = %next, "Session state change");
        self.state = next;
    }

    /// Connect, subscribe to `topic`, wait up to `timeout` for one message,
    /// store it under `key`, and disconnect.
    ///
    /// On success the store has been written exactly once; on any error it
    /// has not been written at all. The connection is closed on every path.
    pub async fn acquire_one(
        &mut self,
        topic: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<String, AcquisitionError> {
        let started = Instant::now();

        if !self.store.contains(key) {
            return Err(AcquisitionError::UnknownKey(key.to_string()));
        }

        self.transition(SessionState::Connecting);
        let mut conn = match self.broker.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                self.transition(SessionState::Errored);
                self.transition(SessionState::Disconnected);
                return Err(e);
            }
        };

        let outcome = self.receive(&mut conn, topic, timeout).await;

        // Teardown failures are logged, never retried.
        if let Err(e) = conn.close().await {
            warn!(topic, key, error = %e, "Failed to close broker connection");
        }
        self.transition(SessionState::Disconnected);

        let value = outcome?;
        if !self.store.set(key, value.as_str()) {
            return Err(AcquisitionError::UnknownKey(key.to_string()));
        }

        debug!(
            topic,
            key,
            value = %value,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reading acquired"
        );

        Ok(value)
    }

    async fn receive(
        &mut self,
        conn: &mut B::Connection,
        topic: &str,
        timeout: Duration,
    ) -> Result<String, AcquisitionError> {
        if let Err(e) = conn.subscribe(topic).await {
            self.transition(SessionState::Errored);
            return Err(e);
        }
        self.transition(SessionState::Subscribed);

        let result = conn
            .await_message(timeout)
            .await
            .and_then(|payload| decode_payload(&payload));

        match &result {
            Ok(_) => self.transition(SessionState::MessageReceived),
            Err(AcquisitionError::Timeout(_)) => self.transition(SessionState::TimedOut),
            Err(_) => self.transition(SessionState::Errored),
        }

        result
    }
}

/// Decode a payload into a stored reading.
///
/// The payload must be UTF-8 text that parses as a number once surrounding
/// whitespace is removed. The trimmed text is returned unchanged.
pub fn decode_payload(payload: &[u8]) -> Result<String, AcquisitionError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| AcquisitionError::Decode(format!("payload is not UTF-8: {}", e)))?
        .trim();

    if text.parse::<f64>().is_err() {
        return Err(AcquisitionError::Decode(format!(
            "payload '{}' is not a number",
            text
        )));
    }

    Ok(text.to_string())
}
