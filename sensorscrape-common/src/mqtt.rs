//! MQTT implementation of the broker capability, built on `rumqttc`.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::broker::{AcquisitionError, Broker, BrokerConnection};
use crate::config::BrokerConfig;

/// Request channel capacity between the client handle and its event loop.
const REQUEST_CAPACITY: usize = 10;

/// How long `close` waits for the event loop to flush DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

type MessageResult = Result<Vec<u8>, AcquisitionError>;

/// Opens one MQTT connection per acquisition.
#[derive(Debug, Clone)]
pub struct MqttBroker {
    config: BrokerConfig,
}

impl MqttBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive());
        options.set_clean_session(true);
        options.set_credentials(&self.config.username, &self.config.password);
        options
    }
}

impl Broker for MqttBroker {
    type Connection = MqttConnection;

    async fn connect(&self) -> Result<MqttConnection, AcquisitionError> {
        let client_id = format!("{}-{}", self.config.client_id_prefix, Uuid::new_v4().simple());
        let (client, mut eventloop) = AsyncClient::new(self.options(&client_id), REQUEST_CAPACITY);

        debug!(
            host = %self.config.host,
            port = self.config.port,
            client_id = %client_id,
            "Connecting to MQTT broker"
        );

        let connect_timeout = self.config.connect_timeout();
        tokio::time::timeout(connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                AcquisitionError::Connection(format!(
                    "no CONNACK from {}:{} within {:?}",
                    self.config.host, self.config.port, connect_timeout
                ))
            })??;

        trace!(client_id = %client_id, "MQTT connection established");

        let (message_tx, message_rx) = oneshot::channel();
        let events = tokio::spawn(drive_event_loop(
            client.clone(),
            eventloop,
            message_tx,
            client_id.clone(),
        ));

        Ok(MqttConnection {
            client,
            client_id,
            events: Some(events),
            message: Some(message_rx),
        })
    }
}

/// Poll until the broker acknowledges the connection.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), AcquisitionError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(AcquisitionError::Connection(e.to_string())),
        }
    }
}

/// Drive the event loop until the session disconnects.
///
/// The first PUBLISH is handed to the waiting session and a DISCONNECT is
/// requested straight away; anything that arrives after that is dropped.
async fn drive_event_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    message_tx: oneshot::Sender<MessageResult>,
    client_id: String,
) {
    let mut waiting = Some(message_tx);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => match waiting.take() {
                Some(tx) => {
                    trace!(client_id = %client_id, topic = %publish.topic, "Message received");
                    let _ = tx.send(Ok(publish.payload.to_vec()));
                    if let Err(e) = client.try_disconnect() {
                        debug!(client_id = %client_id, error = %e, "Disconnect request failed");
                        break;
                    }
                }
                None => {
                    trace!(client_id = %client_id, topic = %publish.topic, "Dropping extra message");
                }
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                trace!(client_id = %client_id, "DISCONNECT sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                match waiting.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(AcquisitionError::Broker(e.to_string())));
                    }
                    None => {
                        trace!(client_id = %client_id, error = %e, "Event loop ended");
                    }
                }
                break;
            }
        }
    }
}

/// A single-subscription MQTT connection.
///
/// The event loop runs on its own task; dropping the connection aborts it,
/// which closes the socket.
pub struct MqttConnection {
    client: AsyncClient,
    client_id: String,
    events: Option<JoinHandle<()>>,
    message: Option<oneshot::Receiver<MessageResult>>,
}

impl BrokerConnection for MqttConnection {
    async fn subscribe(&mut self, topic: &str) -> Result<(), AcquisitionError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| AcquisitionError::Broker(format!("subscribe to '{}': {}", topic, e)))
    }

    async fn await_message(&mut self, timeout: Duration) -> Result<Vec<u8>, AcquisitionError> {
        let message = self
            .message
            .as_mut()
            .ok_or_else(|| AcquisitionError::Broker("message already consumed".to_string()))?;

        match tokio::time::timeout(timeout, message).await {
            Err(_) => Err(AcquisitionError::Timeout(timeout)),
            Ok(Err(_)) => {
                self.message = None;
                Err(AcquisitionError::Broker(
                    "event loop ended before a message arrived".to_string(),
                ))
            }
            Ok(Ok(result)) => {
                self.message = None;
                result
            }
        }
    }

    async fn close(mut self) -> Result<(), AcquisitionError> {
        let Some(mut events) = self.events.take() else {
            return Ok(());
        };

        if events.is_finished() {
            return Ok(());
        }

        // Already requested after a message; the channel may be full or closed.
        if let Err(e) = self.client.try_disconnect() {
            trace!(client_id = %self.client_id, error = %e, "Disconnect request not queued");
        }

        match tokio::time::timeout(DISCONNECT_GRACE, &mut events).await {
            Ok(_) => Ok(()),
            Err(_) => {
                events.abort();
                warn!(
                    client_id = %self.client_id,
                    "Event loop did not stop in time, aborted"
                );
                Err(AcquisitionError::Broker(format!(
                    "disconnect not acknowledged within {:?}",
                    DISCONNECT_GRACE
                )))
            }
        }
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        if let Some(events) = self.events.take() {
            events.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_broker() -> MqttBroker {
        // Port 1 on localhost is reserved and refuses connections.
        let mut config = BrokerConfig::new("127.0.0.1", 1, "sensor", "secret");
        config.connect_timeout_ms = 500;
        MqttBroker::new(config)
    }

    #[test]
    fn test_options_from_config() {
        let broker = MqttBroker::new(BrokerConfig::new("broker.local", 1884, "sensor", "secret"));
        let options = broker.options("sensorscrape-test");

        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.client_id(), "sensorscrape-test");
        assert_eq!(options.keep_alive(), Duration::from_secs(10));
        assert!(options.clean_session());
        assert_eq!(
            options.credentials(),
            Some(("sensor".to_string(), "secret".to_string()))
        );
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let broker = unreachable_broker();

        let result = broker.connect().await;

        assert!(matches!(result, Err(AcquisitionError::Connection(_))));
    }
}
