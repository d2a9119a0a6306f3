//! InfluxDB 1.x adapter.
//!
//! Points are written one per request to `POST /write?db=<database>` as
//! line protocol; the server assigns the timestamp.

use crate::error::TransportError;
use async_trait::async_trait;
use canopy_core::{SinkError, TimeSeriesSink};
use canopy_protocol::Point;
use std::time::Duration;
use tracing::{debug, info, trace};

/// InfluxDB connection configuration.
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Base URL, e.g. `http://localhost:8086`.
    pub url: String,
    /// Target database.
    pub database: String,
    /// Optional user name for basic auth.
    pub username: Option<String>,
    /// Optional password for basic auth.
    pub password: Option<String>,
    /// Timeout for a single request.
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            database: "home_db".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Time-series sink writing to InfluxDB over HTTP.
#[derive(Debug, Clone)]
pub struct InfluxWriter {
    client: reqwest::Client,
    base_url: String,
    config: InfluxConfig,
}

impl InfluxWriter {
    /// Create a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or database is empty, or if the HTTP
    /// client cannot be built.
    pub fn new(config: InfluxConfig) -> Result<Self, TransportError> {
        let base_url = config.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(TransportError::InvalidConfig("empty InfluxDB URL".into()));
        }
        if config.database.is_empty() {
            return Err(TransportError::InvalidConfig(
                "empty InfluxDB database".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Get the target database.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.config.database
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_ref()),
            None => request,
        }
    }

    fn write_request(&self, line: String) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[("db", self.config.database.as_str())])
            .body(line);
        self.authorize(request)
    }

    fn create_database_request(&self) -> reqwest::RequestBuilder {
        let statement = format!(
            "CREATE DATABASE \"{}\"",
            self.config.database.replace('"', "\\\"")
        );
        let request = self
            .client
            .post(format!("{}/query", self.base_url))
            .query(&[("q", statement.as_str())]);
        self.authorize(request)
    }

    /// Create the target database if it does not exist.
    ///
    /// The statement is idempotent on the server side.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or refuses the query.
    pub async fn ensure_database(&self) -> Result<(), SinkError> {
        send(self.create_database_request()).await?;
        info!(database = %self.config.database, "InfluxDB database ready");
        Ok(())
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<(), SinkError> {
    let response = request
        .send()
        .await
        .map_err(|e| SinkError::Unavailable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(SinkError::Rejected {
            status: status.as_u16(),
            message: message.trim().to_string(),
        });
    }
    trace!(status = status.as_u16(), "InfluxDB request accepted");
    Ok(())
}

#[async_trait]
impl TimeSeriesSink for InfluxWriter {
    async fn write(&self, point: &Point) -> Result<(), SinkError> {
        let line = point.to_line();
        debug!(line = %line, "Writing point");
        send(self.write_request(line)).await
    }
}
