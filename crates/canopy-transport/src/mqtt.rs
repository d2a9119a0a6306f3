//! MQTT adapter.
//!
//! One `rumqttc` client backs both directions: the [`MqttBus`] hands its
//! event loop to one [`BusSession`] at a time, and the [`MqttAlertPublisher`]
//! queues publishes on the shared client. Queued publishes go out while a
//! session is polling the event loop, so alerts raised while the bus is
//! down are sent after the next connect.

use crate::error::TransportError;
use async_trait::async_trait;
use canopy_core::{AlertPublisher, BusConnector, BusError, BusSession, RawMessage, SinkError};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};

/// Smallest keep-alive the client accepts.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// MQTT connection configuration.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Optional user name.
    pub username: Option<String>,
    /// Optional password, used only with a user name.
    pub password: Option<String>,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Capacity of the outgoing request queue.
    pub capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "canopy-bridge".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            capacity: 64,
        }
    }
}

impl MqttConfig {
    /// Build client options.
    ///
    /// # Errors
    ///
    /// Returns an error if the host or client id is empty.
    pub fn options(&self) -> Result<MqttOptions, TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidConfig("empty MQTT host".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(TransportError::InvalidConfig("empty MQTT client id".into()));
        }

        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive.max(MIN_KEEP_ALIVE));
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }
        Ok(options)
    }
}

/// Bus connector backed by a `rumqttc` event loop.
pub struct MqttBus {
    client: AsyncClient,
    event_loop: Arc<Mutex<EventLoop>>,
    broker: String,
}

impl MqttBus {
    /// Create the connector and the alert publisher sharing its client.
    ///
    /// No network activity happens until [`BusConnector::connect`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &MqttConfig) -> Result<(Self, MqttAlertPublisher), TransportError> {
        let options = config.options()?;
        let (client, event_loop) = AsyncClient::new(options, config.capacity.max(1));

        let bus = Self {
            client: client.clone(),
            event_loop: Arc::new(Mutex::new(event_loop)),
            broker: format!("{}:{}", config.host, config.port),
        };
        Ok((bus, MqttAlertPublisher { client }))
    }

    /// Get the broker address.
    #[must_use]
    pub fn broker(&self) -> &str {
        &self.broker
    }
}

#[async_trait]
impl BusConnector for MqttBus {
    async fn connect(&self) -> Result<Box<dyn BusSession>, BusError> {
        let mut event_loop = Arc::clone(&self.event_loop).lock_owned().await;
        debug!(broker = %self.broker, "Connecting to MQTT broker");

        // A session dropped without a network error leaves the old connection
        // open. Close it so the next poll really reconnects; unsent requests
        // move to the pending list and are replayed after ConnAck.
        event_loop.clean();

        // The event loop reconnects on poll and reports ConnAck first.
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!(broker = %self.broker, code = ?ack.code, "Connected");
                    break;
                }
                Ok(event) => trace!(?event, "Event before ConnAck"),
                Err(e) => return Err(BusError::Connect(e.to_string())),
            }
        }

        Ok(Box::new(MqttSession {
            client: self.client.clone(),
            event_loop,
        }))
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

/// An established MQTT session.
///
/// Holds the event loop exclusively until dropped.
pub struct MqttSession {
    client: AsyncClient,
    event_loop: OwnedMutexGuard<EventLoop>,
}

#[async_trait]
impl BusSession for MqttSession {
    async fn subscribe(&mut self, filter: &str) -> Result<(), BusError> {
        let Self { client, event_loop } = self;

        // The request queue may be full of alerts queued while the bus was
        // down. Keep polling so they drain while the subscribe waits for room.
        let request = client.subscribe(filter, QoS::AtMostOnce);
        tokio::pin!(request);
        let mut queued = false;

        loop {
            tokio::select! {
                sent = &mut request, if !queued => {
                    sent.map_err(|e| BusError::Subscribe(e.to_string()))?;
                    queued = true;
                }
                event = event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        debug!(filter, codes = ?ack.return_codes, "Subscription acknowledged");
                        if ack.return_codes.contains(&SubscribeReasonCode::Failure) {
                            warn!(filter, "Broker rejected subscription");
                            return Err(BusError::Subscribe(format!(
                                "broker rejected filter {filter}"
                            )));
                        }
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => return Err(BusError::Subscribe(e.to_string())),
                },
            }
        }
    }

    async fn next_message(&mut self) -> Result<Option<RawMessage>, BusError> {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(Some(RawMessage::new(publish.topic, publish.payload)));
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return Ok(None),
                Ok(_) => {}
                Err(e) => return Err(BusError::ConnectionLost(e.to_string())),
            }
        }
    }
}

/// Publishes alerts on the shared MQTT client.
///
/// Alerts are queued for the event loop and sent while a session polls it.
/// Only a full request queue fails the publish.
#[derive(Clone)]
pub struct MqttAlertPublisher {
    client: AsyncClient,
}

#[async_trait]
impl AlertPublisher for MqttAlertPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), SinkError> {
        // Never waits on a full request queue, the event loop may be idle
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }
}
