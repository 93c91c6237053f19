//! Process-wide view of instance health.
//!
//! # Responsibilities
//! - Hold the latest observation per instance
//! - Fall back to the registry-advertised score when no check has run
//! - Serve concurrent readers and one writer per instance without caller locking

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::health::observation::HealthObservation;
use crate::registry::{Instance, InstanceId};

/// Shared mapping of instance id to latest health observation.
///
/// Cloning is cheap; all clones observe the same map. Reads and writes are
/// atomic per key. There is no cross-key consistency.
#[derive(Debug, Clone, Default)]
pub struct InstanceHealthView {
    inner: Arc<DashMap<InstanceId, HealthObservation>>,
}

impl InstanceHealthView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live score for an instance, if any check has completed.
    pub fn get(&self, id: &InstanceId) -> Option<f64> {
        self.inner.get(id).map(|r| r.value().score())
    }

    /// Full latest observation for an instance.
    pub fn observation(&self, id: &InstanceId) -> Option<HealthObservation> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    /// Live score if present, otherwise the advertised score.
    pub fn effective_health(&self, instance: &Instance) -> f64 {
        self.get(&instance.id).unwrap_or(instance.advertised_health)
    }

    /// Record an observation. A stale observation (lower sequence than the
    /// stored one) is dropped so the most recent write wins.
    pub fn set(&self, observation: HealthObservation) {
        self.inner
            .entry(observation.instance_id.clone())
            .and_modify(|current| {
                if observation.sequence >= current.sequence {
                    *current = observation.clone();
                }
            })
            .or_insert(observation);
    }

    /// Forget an instance (e.g. removed from the registry).
    pub fn remove(&self, id: &InstanceId) -> Option<HealthObservation> {
        self.inner.remove(id).map(|(_, obs)| obs)
    }

    /// Effective health of every given instance, keyed by id.
    pub fn snapshot(&self, instances: &[Arc<Instance>]) -> HashMap<InstanceId, f64> {
        instances
            .iter()
            .map(|i| (i.id.clone(), self.effective_health(i)))
            .collect()
    }

    /// Number of instances with a live observation.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::observation::HealthStatus;

    #[test]
    fn test_fallback_to_advertised() {
        let view = InstanceHealthView::new();
        let instance = Instance::new("a", "http://a", 70.0);

        assert_eq!(view.get(&instance.id), None);
        assert_eq!(view.effective_health(&instance), 70.0);

        view.set(HealthObservation::unreachable(instance.id.clone()));
        assert_eq!(view.get(&instance.id), Some(0.0));
        assert_eq!(view.effective_health(&instance), 0.0);
    }

    #[test]
    fn test_stale_write_is_dropped() {
        let view = InstanceHealthView::new();
        let id = InstanceId::from("a");
        let older = HealthObservation::new(id.clone(), HealthStatus::Score(10.0));
        let newer = HealthObservation::new(id.clone(), HealthStatus::Score(90.0));

        view.set(newer);
        view.set(older);
        assert_eq!(view.get(&id), Some(90.0));
    }

    #[test]
    fn test_remove_restores_fallback() {
        let view = InstanceHealthView::new();
        let instance = Instance::new("a", "http://a", 55.0);
        view.set(HealthObservation::new(instance.id.clone(), HealthStatus::Score(99.0)));
        assert!(view.remove(&instance.id).is_some());
        assert_eq!(view.effective_health(&instance), 55.0);
        assert!(view.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let view = InstanceHealthView::new();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let view = view.clone();
                std::thread::spawn(move || {
                    let id = InstanceId::from(format!("inst-{}", n));
                    for score in 0..100 {
                        view.set(HealthObservation::new(id.clone(), HealthStatus::Score(score as f64)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(view.len(), 8);
        for n in 0..8 {
            assert_eq!(view.get(&InstanceId::from(format!("inst-{}", n))), Some(99.0));
        }
    }
}
