//! HTTP handlers for the Canopy bridge.
//!
//! Serves the observer WebSocket endpoint plus health and stats.

use crate::config::Config;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use canopy_core::{Bridge, ConnectionState, ObserverHub};
use canopy_protocol::{codec, EventFormat, LiveEvent, ProtocolError, SCHEMA_VERSION};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared server state.
pub struct AppState {
    /// Live-update hub.
    pub hub: Arc<ObserverHub>,
    /// The bridge pipeline, for stats.
    pub bridge: Arc<Bridge>,
    /// Bus connection state.
    pub bus_state: watch::Receiver<ConnectionState>,
    /// Closes observer connections on shutdown.
    pub shutdown: CancellationToken,
    next_observer: AtomicU64,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(
        hub: Arc<ObserverHub>,
        bridge: Arc<Bridge>,
        bus_state: watch::Receiver<ConnectionState>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            hub,
            bridge,
            bus_state,
            shutdown,
            next_observer: AtomicU64::new(1),
        }
    }

    fn next_observer_id(&self) -> String {
        format!("obs-{}", self.next_observer.fetch_add(1, Ordering::Relaxed))
    }
}

/// Query parameters of the observer endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ObserverParams {
    #[serde(default)]
    pub format: EventFormat,
}

/// Build the HTTP router.
pub fn router(config: &Config, state: Arc<AppState>) -> Router {
    Router::new()
        .route(&config.http.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Run the HTTP server until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(
    config: &Config,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(config, state);

    let addr = config.http_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "HTTP server listening");
    info!(
        "Observer endpoint: ws://{}{}",
        addr, config.http.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let bus = *state.bus_state.borrow();
    let status = if bus == ConnectionState::Subscribed {
        "ok"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "bus": bus,
    }))
}

/// Pipeline statistics handler.
async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "correlation": state.bridge.cache_stats(),
        "observers": state.hub.observer_count(),
        "schema_version": SCHEMA_VERSION,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ObserverParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_observer(socket, state, params.format))
}

/// Encode an event as a WebSocket message.
fn event_message(event: &LiveEvent, format: EventFormat) -> Result<Message, ProtocolError> {
    let data = codec::encode(event, format)?;
    Ok(if format.is_text() {
        Message::Text(String::from_utf8_lossy(&data).into_owned())
    } else {
        Message::Binary(data.to_vec())
    })
}

/// Handle an observer connection.
async fn handle_observer(socket: WebSocket, state: Arc<AppState>, format: EventFormat) {
    let observer_id = state.next_observer_id();
    let mut events = state.hub.subscribe(observer_id.as_str());
    let (mut sender, mut receiver) = socket.split();

    debug!(observer = %observer_id, ?format, "Observer connected");

    match event_message(&LiveEvent::welcome(observer_id.as_str()), format) {
        Ok(welcome) => {
            if sender.send(welcome).await.is_err() {
                state.hub.unsubscribe(&observer_id);
                return;
            }
        }
        Err(e) => warn!(observer = %observer_id, error = %e, "Failed to encode welcome"),
    }

    loop {
        tokio::select! {
            biased;

            _ = state.shutdown.cancelled() => break,

            event = events.recv() => {
                match event {
                    Ok(event) => match event_message(&event, format) {
                        Ok(message) => {
                            if sender.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(observer = %observer_id, event = event.name(), error = %e, "Failed to encode event");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(observer = %observer_id, skipped, "Observer lagging, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(observer = %observer_id, "Received close frame");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Observers are receive-only
                    }
                    Some(Err(e)) => {
                        warn!(observer = %observer_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.hub.unsubscribe(&observer_id);
    debug!(observer = %observer_id, "Observer disconnected");
}
