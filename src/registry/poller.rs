//! Periodic registry polling.
//!
//! # Responsibilities
//! - Fetch the instance list on a fixed period
//! - Push each snapshot into the routing controller
//! - Keep the last good snapshot and back off while the registry fails

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::observability::metrics;
use crate::registry::client::InstanceRegistry;
use crate::resilience::Backoff;
use crate::routing::RoutingController;

pub struct RegistryPoller {
    registry: Arc<dyn InstanceRegistry>,
    controller: Arc<RoutingController>,
    interval: Duration,
    backoff: Backoff,
}

impl RegistryPoller {
    pub fn new(
        registry: Arc<dyn InstanceRegistry>,
        controller: Arc<RoutingController>,
        interval: Duration,
        max_backoff: Duration,
    ) -> Self {
        // Retries start well below the regular period.
        let base = (interval / 10).max(Duration::from_millis(100));
        Self {
            registry,
            controller,
            interval,
            backoff: Backoff::new(base, max_backoff.max(base)),
        }
    }

    /// Fetch once and apply. Returns false when the registry failed.
    pub async fn poll_once(&self) -> bool {
        match self.registry.list_instances().await {
            Ok(instances) => {
                tracing::debug!(count = instances.len(), "Registry poll succeeded");
                metrics::record_registry_poll("ok");
                self.controller.sync_instances(instances).await;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Registry poll failed, keeping last snapshot");
                metrics::record_registry_poll("error");
                false
            }
        }
    }

    /// Poll until `shutdown` fires. The first poll happens immediately.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Registry poller starting");

        loop {
            let delay = if self.poll_once().await {
                self.backoff.reset();
                self.interval
            } else {
                self.backoff.next_delay()
            };

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Registry poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthObservation, HealthProbe};
    use crate::registry::client::RegistryError;
    use crate::registry::Instance;
    use crate::routing::RoutingSettings;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopProbe;

    #[async_trait]
    impl HealthProbe for NoopProbe {
        async fn check(&self, instance: &Instance) -> HealthObservation {
            HealthObservation::unreachable(instance.id.clone())
        }
    }

    /// Fails on the second call only.
    struct FlakyRegistry {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InstanceRegistry for FlakyRegistry {
        async fn list_instances(&self) -> Result<Vec<Instance>, RegistryError> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                1 => Err(RegistryError::Rejected("maintenance".to_string())),
                _ => Ok(vec![Instance::new("a", "http://a", 90.0)]),
            }
        }
    }

    fn controller() -> Arc<RoutingController> {
        let settings = RoutingSettings {
            health_checks_enabled: false,
            ..RoutingSettings::default()
        };
        RoutingController::new(settings, Arc::new(NoopProbe))
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_snapshot() {
        let controller = controller();
        let registry = Arc::new(FlakyRegistry { calls: AtomicUsize::new(0) });
        let poller = RegistryPoller::new(registry, controller.clone(), Duration::from_secs(60), Duration::from_secs(1));

        assert!(poller.poll_once().await);
        assert_eq!(controller.instances().len(), 1);

        assert!(!poller.poll_once().await);
        assert_eq!(controller.instances().len(), 1);
        assert_eq!(controller.current_instance().unwrap().id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let controller = controller();
        let registry = Arc::new(FlakyRegistry { calls: AtomicUsize::new(0) });
        let poller = RegistryPoller::new(registry.clone(), controller, Duration::from_millis(10), Duration::from_millis(50));

        let shutdown = crate::lifecycle::Shutdown::new();
        let task = tokio::spawn(poller.run(shutdown.subscribe()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(registry.calls.load(Ordering::SeqCst) >= 2);
    }
}
