//! Domain values flowing through the bridge pipeline.

use bytes::Bytes;
use canopy_protocol::{LiveEvent, ObservationStatus, Point};

/// A message as delivered by the bus.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Bytes,
}

impl RawMessage {
    /// Create a new raw message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// A decoded telemetry value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Origin location.
    pub location: String,
    /// Measurement name, verbatim from the topic.
    pub measurement: String,
    /// Decoded value.
    pub value: f64,
}

impl Reading {
    /// Create a new reading.
    #[must_use]
    pub fn new(location: impl Into<String>, measurement: impl Into<String>, value: f64) -> Self {
        Self {
            location: location.into(),
            measurement: measurement.into(),
            value,
        }
    }

    /// The time-series point persisted for this reading.
    #[must_use]
    pub fn to_point(&self) -> Point {
        Point::reading(&self.measurement, &self.location, self.value)
    }
}

/// An audio/event token. Bypasses correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEvent {
    /// Origin location.
    pub location: String,
    /// Opaque payload.
    pub payload: String,
}

impl AudioEvent {
    /// Create a new audio event.
    #[must_use]
    pub fn new(location: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            payload: payload.into(),
        }
    }

    /// The live-update event broadcast for this token.
    #[must_use]
    pub fn to_live_event(&self) -> LiveEvent {
        LiveEvent::audio(&self.location, &self.payload)
    }
}

/// A completed temperature/humidity pair for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedObservation {
    /// Origin location.
    pub location: String,
    /// Temperature value.
    pub temperature: f64,
    /// Humidity value.
    pub humidity: f64,
}

impl PairedObservation {
    /// Create a new paired observation.
    #[must_use]
    pub fn new(location: impl Into<String>, temperature: f64, humidity: f64) -> Self {
        Self {
            location: location.into(),
            temperature,
            humidity,
        }
    }

    /// Input vector for the decision function.
    #[must_use]
    pub fn features(&self) -> [f64; 2] {
        [self.temperature, self.humidity]
    }

    /// The live-update event broadcast for this observation.
    #[must_use]
    pub fn to_live_event(&self, status: ObservationStatus) -> LiveEvent {
        LiveEvent::observation(&self.location, self.temperature, self.humidity, status)
    }
}

/// Classification result for one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Whether the observation is within acceptable conditions.
    pub good: bool,
    /// Raw score returned by the decision function.
    pub score: f64,
}

impl Verdict {
    /// Status reported to observers for this verdict.
    #[must_use]
    pub fn status(&self) -> ObservationStatus {
        if self.good {
            ObservationStatus::Good
        } else {
            ObservationStatus::Bad
        }
    }
}

/// Status for an optional verdict; a missing verdict is `Unknown`.
#[must_use]
pub fn status_of(verdict: Option<&Verdict>) -> ObservationStatus {
    verdict.map_or(ObservationStatus::Unknown, Verdict::status)
}
