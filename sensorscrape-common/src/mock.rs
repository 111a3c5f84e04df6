//! Scripted in-memory broker for tests.
//!
//! Each topic is given a [`Script`] describing what the broker does once a
//! connection subscribes to it. The broker counts connects, closes and
//! connections that are still open, so tests can assert that every session
//! released what it opened.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::broker::{AcquisitionError, Broker, BrokerConnection};

/// What the broker does for a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Deliver this payload immediately.
    Publish(Vec<u8>),
    /// Deliver this payload after a delay.
    Delayed(Duration, Vec<u8>),
    /// Never publish anything.
    Silent,
    /// Fail the subscription with a broker error.
    RejectSubscribe,
    /// Drop the connection while waiting for a message.
    Drop,
}

impl Script {
    pub fn publish(payload: impl AsRef<[u8]>) -> Self {
        Script::Publish(payload.as_ref().to_vec())
    }

    pub fn delayed(delay: Duration, payload: impl AsRef<[u8]>) -> Self {
        Script::Delayed(delay, payload.as_ref().to_vec())
    }
}

#[derive(Debug, Default)]
struct Inner {
    scripts: Mutex<HashMap<String, Script>>,
    refused: Mutex<HashSet<usize>>,
    refuse_all: Mutex<bool>,
    subscriptions: Mutex<Vec<String>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    open: AtomicUsize,
}

/// A broker whose behaviour is scripted per topic.
///
/// Topics without a script behave as [`Script::Silent`].
#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    inner: Arc<Inner>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the behaviour for `topic`.
    pub fn script(&self, topic: impl Into<String>, script: Script) -> &Self {
        self.inner.scripts.lock().insert(topic.into(), script);
        self
    }

    /// Refuse the `n`th connection attempt (zero-based, counted across the
    /// broker's lifetime).
    pub fn refuse_connection(&self, n: usize) -> &Self {
        self.inner.refused.lock().insert(n);
        self
    }

    /// Refuse (or stop refusing) every connection attempt.
    pub fn set_unreachable(&self, unreachable: bool) -> &Self {
        *self.inner.refuse_all.lock() = unreachable;
        self
    }

    /// Connection attempts so far, including refused ones.
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Connections released so far, by `close` or drop.
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Topics subscribed so far, in order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions.lock().clone()
    }
}

impl Broker for MockBroker {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, AcquisitionError> {
        let attempt = self.inner.connects.fetch_add(1, Ordering::SeqCst);

        if *self.inner.refuse_all.lock() || self.inner.refused.lock().contains(&attempt) {
            return Err(AcquisitionError::Connection(format!(
                "connection #{} refused",
                attempt
            )));
        }

        self.inner.open.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            inner: self.inner.clone(),
            script: None,
            released: false,
        })
    }
}

/// A connection handed out by [`MockBroker`].
#[derive(Debug)]
pub struct MockConnection {
    inner: Arc<Inner>,
    script: Option<Script>,
    released: bool,
}

impl MockConnection {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.open.fetch_sub(1, Ordering::SeqCst);
            self.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl BrokerConnection for MockConnection {
    async fn subscribe(&mut self, topic: &str) -> Result<(), AcquisitionError> {
        self.inner.subscriptions.lock().push(topic.to_string());

        let script = self
            .inner
            .scripts
            .lock()
            .get(topic)
            .cloned()
            .unwrap_or(Script::Silent);

        if script == Script::RejectSubscribe {
            return Err(AcquisitionError::Broker(format!(
                "subscription to '{}' rejected",
                topic
            )));
        }

        self.script = Some(script);
        Ok(())
    }

    async fn await_message(&mut self, timeout: Duration) -> Result<Vec<u8>, AcquisitionError> {
        match self.script.take() {
            Some(Script::Publish(payload)) => Ok(payload),
            Some(Script::Delayed(delay, payload)) if delay < timeout => {
                tokio::time::sleep(delay).await;
                Ok(payload)
            }
            Some(Script::Drop) => Err(AcquisitionError::Broker(
                "connection dropped by broker".to_string(),
            )),
            Some(Script::Delayed(..)) | Some(Script::Silent) => {
                tokio::time::sleep(timeout).await;
                Err(AcquisitionError::Timeout(timeout))
            }
            Some(Script::RejectSubscribe) | None => Err(AcquisitionError::Broker(
                "no active subscription".to_string(),
            )),
        }
    }

    async fn close(mut self) -> Result<(), AcquisitionError> {
        self.release();
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.release();
    }
}
