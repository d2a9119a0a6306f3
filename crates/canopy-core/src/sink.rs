//! Sink abstraction traits.
//!
//! Each output effect of the bridge is a trait so the fan-out stays
//! independent of the concrete store, bus and observer transport.

use async_trait::async_trait;
use canopy_protocol::{LiveEvent, Point};
use std::fmt;
use thiserror::Error;

/// Identifies one of the three output effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// Time-series persistence.
    Persist,
    /// Alert publish back onto the bus.
    Alert,
    /// Live-update broadcast to observers.
    Broadcast,
}

impl SinkKind {
    /// Label for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Persist => "persist",
            SinkKind::Alert => "alert",
            SinkKind::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not be reached.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// The sink rejected the write.
    #[error("Sink rejected write with status {status}: {message}")]
    Rejected {
        /// Status code reported by the sink.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Encoding the payload failed.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Writes one time-series point per call.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    /// Write a point; the store assigns the timestamp.
    async fn write(&self, point: &Point) -> Result<(), SinkError>;
}

/// Publishes alert messages onto the bus.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    /// Publish a string payload on a topic.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), SinkError>;
}

/// Broadcasts live-update events to all connected observers.
///
/// Best effort: no acknowledgment or delivery guarantee.
#[async_trait]
pub trait LiveBroadcaster: Send + Sync {
    /// Broadcast an event. Returns the number of observers it reached.
    async fn broadcast(&self, event: LiveEvent) -> Result<usize, SinkError>;
}
