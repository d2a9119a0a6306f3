//! Bridge controller.
//!
//! Owns the bus subscription lifecycle as an explicit state machine:
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Subscribed
//!      ▲               │              │
//!      └───────────────┴──────────────┘  (failure or connection loss, after backoff)
//! ```
//!
//! While `Subscribed`, every inbound message is run through the [`Bridge`]
//! to completion before the next one is read, which keeps each location's
//! readings in arrival order.

use crate::bridge::Bridge;
use crate::metrics;
use crate::observation::RawMessage;
use crate::reconnect::{next_delay, ReconnectConfig};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// Could not establish a connection.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The broker refused or failed the subscription.
    #[error("Subscription failed: {0}")]
    Subscribe(String),

    /// An established connection dropped.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
}

/// Opens sessions with the bus.
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Connect and wait until the broker accepts the session.
    async fn connect(&self) -> Result<Box<dyn BusSession>, BusError>;

    /// Get the connector name (e.g., "mqtt").
    fn name(&self) -> &'static str;
}

/// An established bus session.
#[async_trait]
pub trait BusSession: Send {
    /// Subscribe to a topic filter.
    async fn subscribe(&mut self, filter: &str) -> Result<(), BusError>;

    /// Receive the next message.
    ///
    /// Returns `None` if the session closed cleanly.
    async fn next_message(&mut self) -> Result<Option<RawMessage>, BusError>;
}

/// Connection state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
        };
        f.write_str(name)
    }
}

/// Why a subscribed session ended.
enum SessionEnd {
    Cancelled,
    Closed,
    Lost(BusError),
}

/// Drives the bus lifecycle and feeds messages into the bridge.
pub struct BridgeController {
    connector: Arc<dyn BusConnector>,
    bridge: Arc<Bridge>,
    filter: String,
    reconnect: ReconnectConfig,
    state: watch::Sender<ConnectionState>,
}

impl BridgeController {
    /// Create a controller that subscribes to `filter` on every connection.
    #[must_use]
    pub fn new(
        connector: Arc<dyn BusConnector>,
        bridge: Arc<Bridge>,
        filter: impl Into<String>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            bridge,
            filter: filter.into(),
            reconnect,
            state,
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Bus state changed");
        }
    }

    /// Run until `cancel` is triggered, reconnecting on any failure.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut delay = self.reconnect.initial_delay;
        let mut attempt = 0u32;

        info!(bus = self.connector.name(), filter = %self.filter, "Starting bridge controller");

        loop {
            attempt += 1;
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(mut session) => {
                    let subscribed = tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = session.subscribe(&self.filter) => result,
                    };

                    match subscribed {
                        Ok(()) => {
                            self.set_state(ConnectionState::Subscribed);
                            info!(bus = self.connector.name(), filter = %self.filter, attempt, "Subscribed");
                            delay = self.reconnect.initial_delay;
                            attempt = 0;

                            match self.pump(session.as_mut(), &cancel).await {
                                SessionEnd::Cancelled => break,
                                SessionEnd::Closed => warn!("Bus session closed"),
                                SessionEnd::Lost(e) => warn!(error = %e, "Bus connection lost"),
                            }
                        }
                        Err(e) => warn!(error = %e, "Subscription failed"),
                    }
                }
                Err(e) => warn!(attempt, error = %e, "Connection attempt failed"),
            }

            self.set_state(ConnectionState::Disconnected);
            metrics::record_reconnect();
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting to bus");

            // Wait before the next attempt, respecting cancellation.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = next_delay(delay, &self.reconnect);
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Bridge controller stopped");
    }

    async fn pump(&self, session: &mut dyn BusSession, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = session.next_message() => next,
            };

            match next {
                Ok(Some(message)) => {
                    self.bridge.handle(message).await;
                }
                Ok(None) => return SessionEnd::Closed,
                Err(e) => return SessionEnd::Lost(e),
            }
        }
    }
}

impl fmt::Debug for BridgeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeController")
            .field("bus", &self.connector.name())
            .field("filter", &self.filter)
            .field("state", &self.state())
            .finish()
    }
}
