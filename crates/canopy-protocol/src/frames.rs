//! Live-update event types.
//!
//! Events are what connected observers receive. Each event has a name and a
//! flat payload of primitive values; on the wire this is
//! `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the live-event schema, announced in the welcome event.
pub const SCHEMA_VERSION: u8 = 1;

/// Classification status attached to an observation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    /// The decision function classified the observation as good.
    Good,
    /// The decision function classified the observation as bad.
    Bad,
    /// Classification failed; no verdict is available.
    Unknown,
}

impl ObservationStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationStatus::Good => "good",
            ObservationStatus::Bad => "bad",
            ObservationStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ObservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live-update event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum LiveEvent {
    /// A classified temperature/humidity pair for one location.
    #[serde(rename = "observation")]
    Observation {
        /// Origin location.
        location: String,
        /// Temperature reading.
        temperature: f64,
        /// Humidity reading.
        humidity: f64,
        /// Classification status.
        status: ObservationStatus,
    },

    /// An audio/event token, forwarded without correlation.
    #[serde(rename = "audio")]
    Audio {
        /// Origin location.
        location: String,
        /// Opaque payload.
        payload: String,
    },

    /// Sent once to each observer after it connects.
    #[serde(rename = "welcome")]
    Welcome {
        /// Identifier assigned to the observer.
        observer_id: String,
        /// Live-event schema version.
        version: u8,
    },
}

impl LiveEvent {
    /// Get the event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Observation { .. } => "observation",
            LiveEvent::Audio { .. } => "audio",
            LiveEvent::Welcome { .. } => "welcome",
        }
    }

    /// Get the location the event concerns, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            LiveEvent::Observation { location, .. } | LiveEvent::Audio { location, .. } => {
                Some(location)
            }
            LiveEvent::Welcome { .. } => None,
        }
    }

    /// Create a new observation event.
    #[must_use]
    pub fn observation(
        location: impl Into<String>,
        temperature: f64,
        humidity: f64,
        status: ObservationStatus,
    ) -> Self {
        LiveEvent::Observation {
            location: location.into(),
            temperature,
            humidity,
            status,
        }
    }

    /// Create a new audio event.
    #[must_use]
    pub fn audio(location: impl Into<String>, payload: impl Into<String>) -> Self {
        LiveEvent::Audio {
            location: location.into(),
            payload: payload.into(),
        }
    }

    /// Create a new welcome event.
    #[must_use]
    pub fn welcome(observer_id: impl Into<String>) -> Self {
        LiveEvent::Welcome {
            observer_id: observer_id.into(),
            version: SCHEMA_VERSION,
        }
    }
}
