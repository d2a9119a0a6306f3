//! Bridge configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - TOML file (`--config`, or the first of the default paths that exists)
//! - Environment variables (`CANOPY__<SECTION>__<KEY>`)

use anyhow::{Context, Result};
use canopy_core::{CacheConfig, ComfortBand, FanOutConfig, ReconnectConfig};
use canopy_protocol::{alert_topic, subscription_filter, DEFAULT_NAMESPACE};
use canopy_transport::{InfluxConfig, MqttConfig};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "CANOPY";

/// Searched in order when no explicit path is given.
const DEFAULT_PATHS: [&str; 3] = [
    "canopy.toml",
    "/etc/canopy/canopy.toml",
    "~/.config/canopy/canopy.toml",
];

/// Bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Message bus connection.
    #[serde(default)]
    pub mqtt: MqttSection,

    /// Time-series store.
    #[serde(default)]
    pub influx: InfluxSection,

    /// Observer and health HTTP server.
    #[serde(default)]
    pub http: HttpSection,

    /// Decision function.
    #[serde(default)]
    pub classifier: ClassifierSection,

    /// Correlation cache.
    #[serde(default)]
    pub correlation: CorrelationSection,

    /// Sink fan-out queues.
    #[serde(default)]
    pub fanout: FanOutSection,

    /// Bus reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectSection,

    /// Prometheus exporter.
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// MQTT configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSection {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Outgoing request queue capacity.
    #[serde(default = "default_mqtt_capacity")]
    pub capacity: usize,

    /// First topic segment of telemetry and alert topics.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

/// InfluxDB configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxSection {
    #[serde(default = "default_influx_url")]
    pub url: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in milliseconds.
    #[serde(default = "default_influx_timeout")]
    pub timeout_ms: u64,

    /// Issue `CREATE DATABASE` at startup.
    #[serde(default = "default_true")]
    pub create_database: bool,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Path of the observer WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Classifier configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierSection {
    /// JSON weights for the dense model. The comfort band is used if unset.
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    #[serde(default)]
    pub comfort: ComfortBand,
}

/// Correlation cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationSection {
    /// Seconds a partial reading may wait for its counterpart.
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Seconds between stale-entry sweeps.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

/// Fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutSection {
    /// Capacity of each sink queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Capacity of the observer broadcast channel.
    #[serde(default = "default_queue_capacity")]
    pub hub_capacity: usize,
}

/// Reconnect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSection {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "canopy-bridge".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_mqtt_capacity() -> usize {
    64
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_influx_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_database() -> String {
    "home_db".to_string()
}

fn default_influx_timeout() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_prune_interval() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            capacity: default_mqtt_capacity(),
            namespace: default_namespace(),
        }
    }
}

impl Default for InfluxSection {
    fn default() -> Self {
        Self {
            url: default_influx_url(),
            database: default_database(),
            username: None,
            password: None,
            timeout_ms: default_influx_timeout(),
            create_database: true,
        }
    }
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for CorrelationSection {
    fn default() -> Self {
        Self {
            retention_secs: None,
            prune_interval_secs: default_prune_interval(),
        }
    }
}

impl Default for FanOutSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            hub_capacity: default_queue_capacity(),
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the first default path that
    /// exists, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or if any source
    /// cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_default(),
        };

        let mut builder = config::Config::builder();
        if let Some(file) = &file {
            builder = builder.add_source(File::from(file.as_path()).required(true));
            tracing::info!(path = %file.display(), "Loading configuration file");
        }

        Self::from_builder(builder.add_source(Self::environment()))
            .with_context(|| match &file {
                Some(file) => format!("Failed to load configuration from {}", file.display()),
                None => "Failed to load configuration".to_string(),
            })
    }

    fn find_default() -> Option<PathBuf> {
        DEFAULT_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Get the HTTP socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn http_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.http.host, self.http.port)
            .parse()
            .with_context(|| format!("Invalid HTTP address {}:{}", self.http.host, self.http.port))
    }

    /// Topic filter the bridge subscribes to.
    #[must_use]
    pub fn subscription_filter(&self) -> String {
        subscription_filter(&self.mqtt.namespace)
    }

    /// Build the MQTT adapter configuration.
    #[must_use]
    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            client_id: self.mqtt.client_id.clone(),
            username: self.mqtt.username.clone(),
            password: self.mqtt.password.clone(),
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            capacity: self.mqtt.capacity,
        }
    }

    /// Build the InfluxDB adapter configuration.
    #[must_use]
    pub fn influx_config(&self) -> InfluxConfig {
        InfluxConfig {
            url: self.influx.url.clone(),
            database: self.influx.database.clone(),
            username: self.influx.username.clone(),
            password: self.influx.password.clone(),
            timeout: Duration::from_millis(self.influx.timeout_ms),
        }
    }

    /// Build the correlation cache configuration.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            retention: self.correlation.retention_secs.map(Duration::from_secs),
        }
    }

    /// Build the fan-out configuration.
    #[must_use]
    pub fn fanout_config(&self) -> FanOutConfig {
        FanOutConfig {
            queue_capacity: self.fanout.queue_capacity,
            alert_topic: alert_topic(&self.mqtt.namespace),
        }
    }

    /// Build the reconnect policy.
    #[must_use]
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            multiplier: self.reconnect.multiplier,
        }
    }
}
