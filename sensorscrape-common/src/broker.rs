//! The broker capability: connect, subscribe once, receive once, close.
//!
//! A [`BrokerConnection`] carries exactly one subscription and yields at most
//! one message. Connections are never pooled; each acquisition opens its own
//! and releases it before returning. Dropping a connection without calling
//! [`BrokerConnection::close`] must still release it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Per-pair acquisition failure. None of these abort an acquisition round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    /// The broker could not be reached or refused the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// No message arrived within the wait budget.
    #[error("No message within {0:?}")]
    Timeout(Duration),

    /// The payload could not be interpreted as a reading.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Protocol-level failure after the connection was established.
    #[error("Broker error: {0}")]
    Broker(String),

    /// The key is not one of the configured measurement keys.
    #[error("Unknown measurement key '{0}'")]
    UnknownKey(String),
}

impl AcquisitionError {
    /// Short label used in logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            AcquisitionError::Connection(_) => "connection",
            AcquisitionError::Timeout(_) => "timeout",
            AcquisitionError::Decode(_) => "decode",
            AcquisitionError::Broker(_) => "broker",
            AcquisitionError::UnknownKey(_) => "unknown_key",
        }
    }
}

/// Opens connections to a publish/subscribe broker.
pub trait Broker: Send + Sync {
    type Connection: BrokerConnection;

    /// Establish a fresh connection using the configured host and credentials.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, AcquisitionError>> + Send;
}

/// A live, single-use broker connection.
pub trait BrokerConnection: Send {
    /// Subscribe to `topic`. Called at most once per connection.
    fn subscribe(
        &mut self,
        topic: &str,
    ) -> impl Future<Output = Result<(), AcquisitionError>> + Send;

    /// Wait for the first message on the subscription.
    ///
    /// Returns [`AcquisitionError::Timeout`] if nothing arrives within
    /// `timeout`.
    fn await_message(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, AcquisitionError>> + Send;

    /// Disconnect and release the connection.
    fn close(self) -> impl Future<Output = Result<(), AcquisitionError>> + Send;
}
