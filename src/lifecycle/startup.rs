//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the probe, controller and registry from validated config
//! - Start background tasks (registry poller, config reload, admin API)
//! - Tear them down in reverse order once shutdown fires
//!
//! # Design Decisions
//! - Fail fast: a probe, registry or listener error aborts startup
//! - A missing config watcher is logged, not fatal
//! - The admin listener binds before any background task starts

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::{serve_admin, AdminState};
use crate::config::{ConfigWatcher, RouterConfig};
use crate::health::HttpProbe;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::{HttpRegistry, InstanceRegistry, RegistryError, RegistryPoller, StaticRegistry};
use crate::routing::{RoutingController, RoutingError, RoutingSettings};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build health probe: {0}")]
    Probe(#[source] reqwest::Error),

    #[error("failed to build registry client: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid {name} address {address}")]
    Address { name: &'static str, address: String },

    #[error("failed to bind admin API on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Running router: controller plus its background tasks.
pub struct RouterApp {
    controller: Arc<RoutingController>,
    tasks: Vec<JoinHandle<()>>,
    admin_addr: Option<SocketAddr>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl RouterApp {
    /// Build every subsystem and start it. `shutdown` stops the background tasks.
    pub async fn start(
        config: RouterConfig,
        config_path: Option<PathBuf>,
        shutdown: &Shutdown,
    ) -> Result<Self, StartupError> {
        if config.observability.metrics_enabled {
            let addr = parse_addr("metrics", &config.observability.metrics_address)?;
            metrics::init_metrics(addr);
        }

        let probe = Arc::new(HttpProbe::new(&config.health_check).map_err(StartupError::Probe)?);
        let controller = RoutingController::new(RoutingSettings::from_config(&config), probe);

        let (registry, static_registry): (Arc<dyn InstanceRegistry>, Option<Arc<StaticRegistry>>) =
            match &config.registry.url {
                Some(url) => {
                    let token = std::env::var(&config.registry.token_env).ok();
                    let timeout = Duration::from_millis(config.registry.timeout_ms);
                    let registry: Arc<dyn InstanceRegistry> =
                        Arc::new(HttpRegistry::new(url.clone(), token, timeout)?);
                    (registry, None)
                }
                None => {
                    let registry = Arc::new(StaticRegistry::new(config.registry.instances.clone()));
                    let shared: Arc<dyn InstanceRegistry> = registry.clone();
                    (shared, Some(registry))
                }
            };

        let admin_listener = if config.admin.enabled {
            let addr = parse_addr("admin", &config.admin.bind_address)?;
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| StartupError::Bind { address: addr, source })?;
            Some(listener)
        } else {
            None
        };
        let admin_addr = admin_listener.as_ref().and_then(|l| l.local_addr().ok());

        controller.on_instance_changed(|change| {
            tracing::info!(
                previous = ?change.previous.as_ref().map(|i| &i.id),
                current = ?change.current.as_ref().map(|i| &i.id),
                reason = change.reason.as_str(),
                "Routing target changed"
            );
        });
        controller.start()?;

        let mut tasks = Vec::new();

        let poller = RegistryPoller::new(
            registry,
            controller.clone(),
            Duration::from_millis(config.registry.poll_interval_ms),
            Duration::from_millis(config.registry.max_backoff_ms),
        );
        tasks.push(tokio::spawn(poller.run(shutdown.subscribe())));

        let watcher = match config_path {
            Some(path) => {
                let (watcher, updates) = ConfigWatcher::new(&path);
                match watcher.run() {
                    Ok(watcher) => {
                        tasks.push(tokio::spawn(apply_reloads(
                            updates,
                            static_registry.clone(),
                            controller.clone(),
                            shutdown.clone(),
                        )));
                        Some(watcher)
                    }
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "Config watcher unavailable, hot reload disabled");
                        None
                    }
                }
            }
            None => None,
        };

        if let Some(listener) = admin_listener {
            let state = AdminState::new(controller.clone(), config.admin.api_key.clone());
            let admin_shutdown = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = serve_admin(listener, state, admin_shutdown).await {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }));
        }

        Ok(Self {
            controller,
            tasks,
            admin_addr,
            _watcher: watcher,
        })
    }

    pub fn controller(&self) -> &Arc<RoutingController> {
        &self.controller
    }

    /// Address the admin API is bound to, when enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Stop the controller and wait for every background task.
    /// `shutdown` must have been triggered first.
    pub async fn shutdown(self) {
        self.controller.stop().await;
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
    }
}

fn parse_addr(name: &'static str, address: &str) -> Result<SocketAddr, StartupError> {
    address.parse().map_err(|_| StartupError::Address {
        name,
        address: address.to_string(),
    })
}

/// Apply reloaded configs. Only the static instance list is hot; other
/// sections take effect on restart.
async fn apply_reloads(
    mut updates: mpsc::UnboundedReceiver<RouterConfig>,
    static_registry: Option<Arc<StaticRegistry>>,
    controller: Arc<RoutingController>,
    shutdown: Shutdown,
) {
    let mut shutdown = shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            update = updates.recv() => {
                let Some(config) = update else { break };
                match &static_registry {
                    Some(registry) => {
                        tracing::info!(instances = config.registry.instances.len(), "Applying reloaded instance list");
                        registry.replace(config.registry.instances.clone());
                        controller.sync_instances(config.registry.instances).await;
                    }
                    None => tracing::info!("Config reloaded; changes apply after restart"),
                }
            }
        }
    }
}
