//! Failover state machine for the currently active instance.
//!
//! # States
//! - Healthy: failure counter below `max_failures`
//! - Failed: counter reached `max_failures`, a switch was requested
//!
//! # State Transitions
//! ```text
//! Healthy → Healthy: score > threshold (counter reset)
//! Healthy → Healthy: score <= threshold, counter + 1 < max_failures
//! Healthy → Failed:  counter reaches max_failures → select_best
//!     candidate found → switch, counter 0, Healthy for the new instance
//!     none found      → stay Failed (routing outage)
//! Failed  → Failed:  score <= threshold → select_best again, counter kept
//! Failed  → Healthy: score > threshold (counter reset, no switch)
//! ```

use std::sync::Arc;

use crate::health::{HealthObservation, InstanceHealthView};
use crate::load_balancer::Selector;
use crate::registry::{Instance, InstanceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Healthy,
    Failed,
}

/// Outcome of feeding one observation to the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum FailoverDecision {
    /// Not for the tracked instance, or already applied.
    Ignored,
    /// Above threshold; counter reset.
    Healthy,
    /// Above threshold after an outage; tracked instance usable again.
    Recovered,
    /// At or below threshold; counter incremented.
    Degraded { failures: u32 },
    /// Threshold crossed and a replacement was found.
    Switch { from: InstanceId, to: Arc<Instance> },
    /// Threshold crossed and nothing qualifies.
    NoCandidate { failures: u32 },
}

#[derive(Debug)]
pub struct FailoverSupervisor {
    threshold: f64,
    max_failures: u32,
    active: Option<InstanceId>,
    failures: u32,
    state: SupervisorState,
    last_sequence: Option<u64>,
}

impl FailoverSupervisor {
    pub fn new(threshold: f64, max_failures: u32) -> Self {
        Self {
            threshold,
            max_failures: max_failures.max(1),
            active: None,
            failures: 0,
            state: SupervisorState::Healthy,
            last_sequence: None,
        }
    }

    pub fn active(&self) -> Option<&InstanceId> {
        self.active.as_ref()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Track a different instance. Resets the counter when the id changes.
    pub fn set_active(&mut self, id: Option<InstanceId>) {
        if self.active == id {
            return;
        }
        self.active = id;
        self.failures = 0;
        self.state = SupervisorState::Healthy;
        self.last_sequence = None;
    }

    /// Apply one observation. The same observation (by sequence) is only
    /// counted once, whichever path delivers it first.
    pub fn observe(
        &mut self,
        observation: &HealthObservation,
        instances: &[Arc<Instance>],
        view: &InstanceHealthView,
    ) -> FailoverDecision {
        if self.active.as_ref() != Some(&observation.instance_id) {
            return FailoverDecision::Ignored;
        }
        if self.last_sequence.is_some_and(|seq| observation.sequence <= seq) {
            return FailoverDecision::Ignored;
        }
        self.last_sequence = Some(observation.sequence);

        if observation.score() > self.threshold {
            let recovered = self.state == SupervisorState::Failed;
            self.failures = 0;
            self.state = SupervisorState::Healthy;
            return if recovered {
                FailoverDecision::Recovered
            } else {
                FailoverDecision::Healthy
            };
        }

        if self.state == SupervisorState::Healthy {
            self.failures += 1;
            if self.failures < self.max_failures {
                return FailoverDecision::Degraded {
                    failures: self.failures,
                };
            }
            self.state = SupervisorState::Failed;
        }

        self.attempt_failover(instances, view)
    }

    fn attempt_failover(&mut self, instances: &[Arc<Instance>], view: &InstanceHealthView) -> FailoverDecision {
        let Some(from) = self.active.clone() else {
            return FailoverDecision::Ignored;
        };

        match Selector::select_best(instances, view, self.threshold, Some(&from)) {
            Some(to) => {
                self.set_active(Some(to.id.clone()));
                FailoverDecision::Switch { from, to }
            }
            None => FailoverDecision::NoCandidate {
                failures: self.failures,
            },
        }
    }
}
