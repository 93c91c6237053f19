//! Periodic health monitoring, one loop per instance.
//!
//! # Responsibilities
//! - Probe one instance immediately, then every interval
//! - Publish each observation into the shared view
//! - Forward each observation to the failover path over a channel
//! - Stop promptly when cancelled

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::health::observation::HealthObservation;
use crate::health::probe::HealthProbe;
use crate::health::view::InstanceHealthView;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::{Instance, InstanceId};

pub struct HealthMonitor {
    instance: Arc<Instance>,
    probe: Arc<dyn HealthProbe>,
    view: InstanceHealthView,
    updates: Option<mpsc::UnboundedSender<HealthObservation>>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        instance: Arc<Instance>,
        probe: Arc<dyn HealthProbe>,
        view: InstanceHealthView,
        interval: Duration,
    ) -> Self {
        Self {
            instance,
            probe,
            view,
            updates: None,
            interval,
        }
    }

    /// Also deliver every observation on `tx`.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<HealthObservation>) -> Self {
        self.updates = Some(tx);
        self
    }

    /// Spawn the loop with its own cancellation signal.
    pub fn spawn(self) -> MonitorHandle {
        let stop = Shutdown::new();
        let shutdown = stop.subscribe();
        let instance = self.instance.clone();
        let task = tokio::spawn(self.run(shutdown));

        MonitorHandle { instance, stop, task }
    }

    /// Run until `shutdown` fires or its sender is dropped.
    ///
    /// Checks never overlap: the next tick is only awaited after the
    /// current check has been published.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(
            instance = %self.instance.id,
            interval_ms = self.interval.as_millis() as u64,
            "Health monitor starting"
        );

        // First tick completes immediately.
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            let observation = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                obs = self.probe.check(&self.instance) => obs,
            };

            self.publish(observation);
        }

        tracing::debug!(instance = %self.instance.id, "Health monitor stopped");
    }

    fn publish(&self, observation: HealthObservation) {
        tracing::trace!(
            instance = %self.instance.id,
            score = observation.score(),
            sequence = observation.sequence,
            "Health observation"
        );
        metrics::record_instance_health(self.instance.id.as_str(), observation.score());

        self.view.set(observation.clone());
        if let Some(tx) = &self.updates {
            let _ = tx.send(observation);
        }
    }
}

/// Owner of a running monitor. Dropping it also stops the loop.
#[derive(Debug)]
pub struct MonitorHandle {
    instance: Arc<Instance>,
    stop: Shutdown,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.stop.trigger();
    }

    /// Cancel and wait for the loop to exit. No write to the view happens
    /// for this instance once this returns.
    pub async fn stop(self) {
        self.stop.trigger();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(instance = %self.instance.id, "Health monitor panicked");
            }
        }
    }
}
