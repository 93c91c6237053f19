//! Model router daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   registry (HTTP or static) ──poll──▶ RoutingController ◀── admin API (read-only)
//!                                          │      ▲
//!                           one monitor per│      │observations
//!                                 instance ▼      │
//!                                     HealthMonitor ──probe──▶ GET {host}/health/{id}
//!
//!   rotation loop:  round-robin over instances above the threshold
//!   failover loop:  N consecutive low scores on the active instance → best alternative
//! ```

use std::path::PathBuf;

use model_router::config::{load_config, RouterConfig};
use model_router::lifecycle::{wait_for_signal, RouterApp, Shutdown};
use model_router::observability::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("ROUTER_CONFIG").map(PathBuf::from));

    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    init_tracing(&config.observability);
    tracing::info!("model-router v{} starting", env!("CARGO_PKG_VERSION"));

    match &config_path {
        Some(path) => tracing::info!(path = ?path, "Configuration loaded"),
        None => tracing::warn!("No config file given, using defaults"),
    }
    tracing::info!(
        threshold = config.routing.health_threshold,
        max_failures = config.routing.max_failures,
        check_interval_ms = config.health_check.interval_ms,
        registry = config.registry.url.as_deref().unwrap_or("static"),
        "Routing configuration"
    );

    let shutdown = Shutdown::new();
    let app = RouterApp::start(config, config_path, &shutdown).await?;
    if let Some(addr) = app.admin_addr() {
        tracing::info!(address = %addr, "Admin API enabled");
    }

    wait_for_signal().await;
    shutdown.trigger();
    app.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
