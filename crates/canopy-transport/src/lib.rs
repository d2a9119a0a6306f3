//! # canopy-transport
//!
//! Adapters between the Canopy bridge and the outside world.
//!
//! - **MQTT** - Bus connector, session and alert publisher over `rumqttc`
//! - **InfluxDB** - Time-series sink speaking the 1.x HTTP write API
//!
//! The bridge only sees the traits from `canopy-core`, so every adapter
//! here can be swapped for a test double.
//!
//! ```rust,ignore
//! use canopy_transport::{InfluxConfig, InfluxWriter, MqttBus, MqttConfig};
//!
//! let (bus, alerts) = MqttBus::new(&MqttConfig::default());
//! let store = InfluxWriter::new(InfluxConfig::default())?;
//! ```

pub mod error;

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "influx")]
pub mod influx;

pub use error::TransportError;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttAlertPublisher, MqttBus, MqttConfig};

#[cfg(feature = "influx")]
pub use influx::{InfluxConfig, InfluxWriter};
