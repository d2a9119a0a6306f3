//! # Canopy
//!
//! Telemetry bridge between an MQTT home-sensor bus and InfluxDB, with
//! comfort classification, bus alerts and live updates for observers.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! canopy
//!
//! # Run with a custom config
//! canopy --config /path/to/canopy.toml
//!
//! # Override single values from the environment
//! CANOPY__MQTT__HOST=broker.lan CANOPY__INFLUX__DATABASE=home_db canopy
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::{Context, Result};
use canopy_core::{
    Bridge, BridgeController, Classifier, CorrelationCache, DecisionFunction, DenseModel, FanOut,
    ObserverHub, Sinks, TopicRouter,
};
use canopy_transport::{InfluxWriter, MqttBus};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "canopy", version, about)]
struct Cli {
    /// Configuration file (defaults to the first of canopy.toml,
    /// /etc/canopy/canopy.toml, ~/.config/canopy/canopy.toml).
    #[arg(short, long, env = "CANOPY_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "canopy_server=info,canopy_core=info,canopy_transport=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Canopy bridge");

    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            warn!(error = %e, "Failed to start metrics server");
        }
    }

    let model = load_model(&config)?;

    // Sinks
    let hub = Arc::new(ObserverHub::with_capacity(config.fanout.hub_capacity));
    let store = InfluxWriter::new(config.influx_config()).context("Invalid InfluxDB settings")?;
    if config.influx.create_database {
        if let Err(e) = store.ensure_database().await {
            warn!(database = store.database(), error = %e, "Could not create database");
        }
    }
    let (bus, alerts) = MqttBus::new(&config.mqtt_config()).context("Invalid MQTT settings")?;

    let sinks = Sinks {
        store: Arc::new(store),
        alerts: Arc::new(alerts),
        live: hub.clone(),
    };
    let (fanout, workers) = FanOut::spawn(sinks, config.fanout_config());

    let bridge = Arc::new(Bridge::new(
        TopicRouter::with_namespace(config.mqtt.namespace.clone()),
        CorrelationCache::with_config(config.cache_config()),
        Classifier::new(model),
        fanout,
    ));

    let controller = Arc::new(BridgeController::new(
        Arc::new(bus),
        bridge.clone(),
        config.subscription_filter(),
        config.reconnect_config(),
    ));

    let shutdown = CancellationToken::new();

    let controller_task = tokio::spawn({
        let controller = controller.clone();
        let shutdown = shutdown.clone();
        async move { controller.run(shutdown).await }
    });

    let prune_task = config.correlation.retention_secs.map(|_| {
        let bridge = bridge.clone();
        let shutdown = shutdown.clone();
        let every = Duration::from_secs(config.correlation.prune_interval_secs.max(1));
        tokio::spawn(async move { prune_loop(bridge, every, shutdown).await })
    });

    let state = Arc::new(handlers::AppState::new(
        hub,
        bridge.clone(),
        controller.watch_state(),
        shutdown.clone(),
    ));
    let server_task = tokio::spawn({
        let config = config.clone();
        let shutdown = shutdown.clone();
        async move {
            let result = handlers::run_server(&config, state, shutdown.clone()).await;
            // A failed server stops the whole bridge
            shutdown.cancel();
            result
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    let served = server_task.await.context("HTTP server task failed")?;
    controller_task.await.context("Controller task failed")?;
    if let Some(task) = prune_task {
        task.await.context("Prune task failed")?;
    }

    // Dropping the last FanOut handle lets the workers drain and exit
    drop(controller);
    drop(bridge);
    workers.join().await;

    info!("Canopy bridge stopped");
    served
}

/// Build the decision function from the classifier settings.
fn load_model(config: &config::Config) -> Result<Arc<dyn DecisionFunction>> {
    match &config.classifier.model_path {
        Some(path) => {
            let model = DenseModel::from_file(path)
                .with_context(|| format!("Failed to load model from {}", path.display()))?;
            Ok(Arc::new(model))
        }
        None => {
            info!("No model configured, using comfort band");
            Ok(Arc::new(config.classifier.comfort.clone()))
        }
    }
}

/// Periodically drop partial readings older than the retention window.
async fn prune_loop(bridge: Arc<Bridge>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let pruned = bridge.prune_stale();
                if pruned > 0 {
                    info!(pruned, "Pruned stale partial readings");
                }
            }
        }
    }
}
