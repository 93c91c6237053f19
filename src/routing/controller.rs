//! Routing controller.
//!
//! # Responsibilities
//! - Own one health monitor per registry instance
//! - Run the rotation loop and the failover loop
//! - Publish the instance to use for the next request
//! - Tear everything down deterministically on `stop`

use arc_swap::{ArcSwap, ArcSwapOption};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::RouterConfig;
use crate::failover::{FailoverDecision, FailoverSupervisor, SupervisorState};
use crate::health::{HealthMonitor, HealthObservation, HealthProbe, InstanceHealthView, MonitorHandle};
use crate::lifecycle::Shutdown;
use crate::load_balancer::Selector;
use crate::observability::metrics;
use crate::registry::{sanitize_snapshot, Instance, InstanceId};

/// Capacity of the change broadcast; slow subscribers skip older changes.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// No instance is active and above the health threshold.
    #[error("no healthy model instance available")]
    NoHealthyInstance,

    #[error("routing controller already started")]
    AlreadyStarted,

    #[error("routing controller stopped")]
    Stopped,
}

/// Why the published instance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Rotation,
    Failover,
    Outage,
    Recovered,
    Removed,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::Rotation => "rotation",
            ChangeReason::Failover => "failover",
            ChangeReason::Outage => "outage",
            ChangeReason::Recovered => "recovered",
            ChangeReason::Removed => "removed",
        }
    }
}

/// Notification sent whenever the published instance changes.
#[derive(Debug, Clone)]
pub struct InstanceChange {
    pub previous: Option<Arc<Instance>>,
    pub current: Option<Arc<Instance>>,
    pub reason: ChangeReason,
}

/// Timings and thresholds for the controller.
#[derive(Debug, Clone)]
pub struct RoutingSettings {
    pub health_threshold: f64,
    pub max_failures: u32,
    pub health_checks_enabled: bool,
    pub check_interval: Duration,
    pub rotation_interval: Duration,
    pub failover_poll_interval: Duration,
}

impl RoutingSettings {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            health_threshold: config.routing.health_threshold,
            max_failures: config.routing.max_failures,
            health_checks_enabled: config.health_check.enabled,
            check_interval: Duration::from_millis(config.health_check.interval_ms),
            rotation_interval: Duration::from_millis(config.routing.rotation_interval_ms),
            failover_poll_interval: Duration::from_millis(config.routing.failover_poll_interval_ms),
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// Point-in-time view of the controller for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingStatus {
    pub current: Option<InstanceId>,
    pub tracked: Option<InstanceId>,
    pub consecutive_failures: u32,
    pub failover_state: &'static str,
    pub instances: usize,
    pub monitors: usize,
}

/// Selection state guarded by one lock.
struct RouteState {
    supervisor: FailoverSupervisor,
    /// Instance the supervisor is watching.
    tracked: Option<Arc<Instance>>,
    /// False while no traffic-capable instance exists.
    available: bool,
}

pub struct RoutingController {
    settings: RoutingSettings,
    probe: Arc<dyn HealthProbe>,
    view: InstanceHealthView,
    selector: Selector,
    instances: ArcSwap<Vec<Arc<Instance>>>,
    current: ArcSwapOption<Instance>,
    state: Mutex<RouteState>,
    monitors: tokio::sync::Mutex<HashMap<InstanceId, MonitorHandle>>,
    monitor_count: AtomicUsize,
    observations_tx: mpsc::UnboundedSender<HealthObservation>,
    observations_rx: Mutex<Option<mpsc::UnboundedReceiver<HealthObservation>>>,
    changes: broadcast::Sender<InstanceChange>,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn same_instance(a: Option<&Arc<Instance>>, b: Option<&Arc<Instance>>) -> bool {
    a.map(|i| &i.id) == b.map(|i| &i.id)
}

impl RoutingController {
    pub fn new(settings: RoutingSettings, probe: Arc<dyn HealthProbe>) -> Arc<Self> {
        let (observations_tx, observations_rx) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let supervisor = FailoverSupervisor::new(settings.health_threshold, settings.max_failures);

        Arc::new(Self {
            settings,
            probe,
            view: InstanceHealthView::new(),
            selector: Selector::new(),
            instances: ArcSwap::from_pointee(Vec::new()),
            current: ArcSwapOption::empty(),
            state: Mutex::new(RouteState {
                supervisor,
                tracked: None,
                available: false,
            }),
            monitors: tokio::sync::Mutex::new(HashMap::new()),
            monitor_count: AtomicUsize::new(0),
            observations_tx,
            observations_rx: Mutex::new(Some(observations_rx)),
            changes,
            shutdown: Shutdown::new(),
            tasks: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &RoutingSettings {
        &self.settings
    }

    pub fn view(&self) -> &InstanceHealthView {
        &self.view
    }

    /// Latest registry snapshot.
    pub fn instances(&self) -> Arc<Vec<Arc<Instance>>> {
        self.instances.load_full()
    }

    /// Instance selected for traffic, or `None` during an outage.
    pub fn current_instance(&self) -> Option<Arc<Instance>> {
        self.current.load_full()
    }

    /// Like `current_instance`, but absence is an explicit error.
    pub fn require_instance(&self) -> Result<Arc<Instance>, RoutingError> {
        self.current_instance().ok_or(RoutingError::NoHealthyInstance)
    }

    /// Effective health of every known instance.
    pub fn health_snapshot(&self) -> HashMap<InstanceId, f64> {
        self.view.snapshot(&self.instances.load())
    }

    pub fn status(&self) -> RoutingStatus {
        let state = lock(&self.state);
        RoutingStatus {
            current: self.current.load_full().map(|i| i.id.clone()),
            tracked: state.tracked.as_ref().map(|i| i.id.clone()),
            consecutive_failures: state.supervisor.failures(),
            failover_state: match state.supervisor.state() {
                SupervisorState::Healthy => "healthy",
                SupervisorState::Failed => "failed",
            },
            instances: self.instances.load().len(),
            monitors: self.monitor_count.load(Ordering::Relaxed),
        }
    }

    /// Receive every change of the published instance.
    pub fn subscribe(&self) -> broadcast::Receiver<InstanceChange> {
        self.changes.subscribe()
    }

    /// Run `callback` for every change, from a dedicated task.
    pub fn on_instance_changed<F>(self: &Arc<Self>, callback: F)
    where
        F: Fn(&InstanceChange) + Send + Sync + 'static,
    {
        // Subscribe before checking `stopped`: `stop` sets the flag before it
        // fires the shutdown signal, so one of the two always catches it.
        let mut shutdown = self.shutdown.subscribe();
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let mut changes = self.changes.subscribe();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    change = changes.recv() => match change {
                        Ok(change) => callback(&change),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Instance change listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        lock(&self.tasks).push(task);
    }

    /// Spawn the rotation and failover loops.
    pub fn start(self: &Arc<Self>) -> Result<(), RoutingError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(RoutingError::Stopped);
        }
        let observations = lock(&self.observations_rx)
            .take()
            .ok_or(RoutingError::AlreadyStarted)?;

        tracing::info!(
            threshold = self.settings.health_threshold,
            max_failures = self.settings.max_failures,
            rotation_interval_ms = self.settings.rotation_interval.as_millis() as u64,
            "Routing controller starting"
        );

        let rotation = tokio::spawn(self.clone().run_rotation(self.shutdown.subscribe()));
        let failover = tokio::spawn(self.clone().run_failover(observations, self.shutdown.subscribe()));

        let mut tasks = lock(&self.tasks);
        tasks.push(rotation);
        tasks.push(failover);
        Ok(())
    }

    /// Cancel every loop and monitor; resolves once all have exited.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Routing controller stopping");
        self.shutdown.trigger();

        let tasks = std::mem::take(&mut *lock(&self.tasks));
        join_all(tasks).await;

        let handles: Vec<MonitorHandle> = {
            let mut monitors = self.monitors.lock().await;
            monitors.drain().map(|(_, handle)| handle).collect()
        };
        join_all(handles.into_iter().map(MonitorHandle::stop)).await;
        self.monitor_count.store(0, Ordering::Relaxed);
        metrics::record_monitors_active(0);

        tracing::info!("Routing controller stopped");
    }

    /// Apply a new registry snapshot.
    pub async fn sync_instances(&self, instances: Vec<Instance>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let instances: Vec<Arc<Instance>> = sanitize_snapshot(instances).into_iter().map(Arc::new).collect();
        let by_id: HashMap<&InstanceId, &Arc<Instance>> = instances.iter().map(|i| (&i.id, i)).collect();

        let mut monitors = self.monitors.lock().await;
        // `stop` may have drained the map while this call waited for the lock.
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let stale: Vec<InstanceId> = monitors
            .iter()
            .filter(|(id, handle)| {
                by_id
                    .get(id)
                    .map_or(true, |i| i.host_address != handle.instance().host_address)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in stale {
            if let Some(handle) = monitors.remove(&id) {
                handle.stop().await;
            }
            if !by_id.contains_key(&id) {
                self.view.remove(&id);
                tracing::info!(instance = %id, "Instance removed from registry");
            } else {
                tracing::info!(instance = %id, "Instance address changed, restarting monitor");
            }
        }

        self.instances.store(Arc::new(instances.clone()));

        if self.settings.health_checks_enabled {
            for instance in &instances {
                if monitors.contains_key(&instance.id) {
                    continue;
                }
                let handle = HealthMonitor::new(
                    instance.clone(),
                    self.probe.clone(),
                    self.view.clone(),
                    self.settings.check_interval,
                )
                .with_updates(self.observations_tx.clone())
                .spawn();
                monitors.insert(instance.id.clone(), handle);
            }
        }

        self.monitor_count.store(monitors.len(), Ordering::Relaxed);
        metrics::record_monitors_active(monitors.len());
        drop(monitors);

        tracing::debug!(instances = instances.len(), "Registry snapshot applied");
        self.reconcile(&instances);
    }

    /// Re-point the tracked instance at fresh registry data and replace it
    /// if it vanished or was deactivated.
    fn reconcile(&self, instances: &[Arc<Instance>]) {
        let mut state = lock(&self.state);

        let Some(tracked) = state.tracked.clone() else {
            drop(state);
            if self.current_instance().is_none() {
                self.rotate();
            }
            return;
        };

        match instances.iter().find(|i| i.id == tracked.id) {
            Some(fresh) if fresh.active => {
                state.tracked = Some(fresh.clone());
                if state.available {
                    self.current.store(Some(fresh.clone()));
                    return;
                }
                // In an outage: the new snapshot may bring a usable instance.
                if let Some(next) = self
                    .selector
                    .select_next(instances, &self.view, self.settings.health_threshold)
                {
                    self.switch_to(&mut state, Some(next), ChangeReason::Rotation);
                }
            }
            _ => {
                let next = self
                    .selector
                    .select_next(instances, &self.view, self.settings.health_threshold);
                if next.is_none() {
                    self.report_no_instance();
                }
                self.switch_to(&mut state, next, ChangeReason::Removed);
            }
        }
    }

    /// One round-robin step.
    pub fn rotate(&self) {
        let instances = self.instances.load_full();
        let next = self
            .selector
            .select_next(&instances, &self.view, self.settings.health_threshold);

        let mut state = lock(&self.state);
        match next {
            Some(instance) => self.switch_to(&mut state, Some(instance), ChangeReason::Rotation),
            None => {
                self.report_no_instance();
                // Keep the tracked instance so the supervisor can see it recover.
                state.available = false;
                self.publish(&state, ChangeReason::Outage);
            }
        }
    }

    /// Feed one observation to the failover state machine.
    pub fn handle_observation(&self, observation: &HealthObservation) {
        let instances = self.instances.load_full();
        let mut state = lock(&self.state);

        match state.supervisor.observe(observation, &instances, &self.view) {
            FailoverDecision::Ignored => {}
            FailoverDecision::Healthy | FailoverDecision::Recovered => {
                if !state.available && state.tracked.is_some() {
                    tracing::info!(instance = %observation.instance_id, score = observation.score(), "Instance recovered");
                    state.available = true;
                    self.publish(&state, ChangeReason::Recovered);
                }
            }
            FailoverDecision::Degraded { failures } => {
                tracing::debug!(
                    instance = %observation.instance_id,
                    score = observation.score(),
                    failures,
                    "Active instance below threshold"
                );
            }
            FailoverDecision::Switch { from, to } => {
                tracing::warn!(from = %from, to = %to.id, "Failing over");
                metrics::record_failover("switched");
                state.tracked = Some(to);
                state.available = true;
                self.publish(&state, ChangeReason::Failover);
            }
            FailoverDecision::NoCandidate { failures } => {
                tracing::error!(
                    instance = %observation.instance_id,
                    failures,
                    "Failover found no healthy candidate"
                );
                metrics::record_failover("no_candidate");
                self.report_no_instance();
                state.available = false;
                self.publish(&state, ChangeReason::Outage);
            }
        }
    }

    /// Re-read the tracked instance's latest observation from the view.
    pub fn poll_tracked(&self) {
        let observation = {
            let state = lock(&self.state);
            state.supervisor.active().and_then(|id| self.view.observation(id))
        };
        if let Some(observation) = observation {
            self.handle_observation(&observation);
        }
    }

    fn switch_to(&self, state: &mut RouteState, next: Option<Arc<Instance>>, reason: ChangeReason) {
        state.supervisor.set_active(next.as_ref().map(|i| i.id.clone()));
        state.available = next.is_some();
        state.tracked = next;
        let reason = if state.available { reason } else { ChangeReason::Outage };
        self.publish(state, reason);
    }

    /// Publish the tracked instance (or `None` when unavailable). Emits a
    /// change only when the published identity differs.
    fn publish(&self, state: &RouteState, reason: ChangeReason) {
        let next = if state.available { state.tracked.clone() } else { None };
        let previous = self.current.swap(next.clone());

        if same_instance(previous.as_ref(), next.as_ref()) {
            return;
        }

        tracing::info!(
            previous = ?previous.as_ref().map(|i| i.id.as_str()),
            current = ?next.as_ref().map(|i| i.id.as_str()),
            reason = reason.as_str(),
            "Active instance changed"
        );
        metrics::record_instance_switch(reason.as_str());

        let _ = self.changes.send(InstanceChange {
            previous,
            current: next,
            reason,
        });
    }

    fn report_no_instance(&self) {
        tracing::warn!(
            error = %RoutingError::NoHealthyInstance,
            threshold = self.settings.health_threshold,
            "Selection returned no instance"
        );
        metrics::record_no_healthy_instance();
    }

    async fn run_rotation(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(self.settings.rotation_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => self.rotate(),
            }
        }
        tracing::debug!("Rotation loop stopped");
    }

    async fn run_failover(
        self: Arc<Self>,
        mut observations: mpsc::UnboundedReceiver<HealthObservation>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = time::interval(self.settings.failover_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                Some(observation) = observations.recv() => self.handle_observation(&observation),
                _ = ticker.tick() => self.poll_tracked(),
            }
        }
        tracing::debug!("Failover loop stopped");
    }
}
