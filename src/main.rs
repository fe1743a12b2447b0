//! tsadmin - MySQL status dashboard
//!
//! Polls each configured database once per interval, turns its status
//! counters into per-second rates, and serves the latest snapshots as JSON.

mod config;
mod metrics;
mod scheduler;
mod source;
mod store;
mod targets;
mod web;

use config::ServerConfig;
use scheduler::Scheduler;
use source::MySqlSource;
use store::SnapshotStore;
use targets::{FileTargetSource, TargetSource};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("tsadmin=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load()?;
    tracing::info!("Starting tsadmin on port {}...", cfg.http_port);
    tracing::info!("Reading databases from {}", cfg.config_path.display());

    // A bad targets file is fatal at startup; later reloads fall back instead.
    let target_source = Arc::new(FileTargetSource::new(&cfg.config_path));
    let targets = target_source.load()?;
    tracing::info!("Monitoring {} databases", targets.len());

    let store = Arc::new(SnapshotStore::new());
    let scheduler = Scheduler::new(
        Arc::new(MySqlSource::new()),
        target_source,
        targets,
        store.clone(),
        cfg.poll_interval,
        cfg.query_timeout,
    );

    // Two cycles before serving, so the first response already has rates
    scheduler.warm_up().await;
    if store.is_empty() {
        tracing::warn!("No database answered during warm-up; serving an empty list until one does");
    }
    scheduler.start().await;

    let server = Server::new(cfg, store);
    let served = server.start(shutdown_signal()).await;

    scheduler.stop().await;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
