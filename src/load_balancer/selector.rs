//! Instance selection.
//!
//! # Responsibilities
//! - Round-robin over active instances above the health threshold
//! - Pick the healthiest alternative for failover
//!
//! # Design Decisions
//! - The eligible list is rebuilt on every call from live data
//! - The rotation cursor is an index into that list, not an identity, so
//!   membership changes shift which instance an index refers to
//! - Ties in `select_best` go to the instance listed first

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::health::InstanceHealthView;
use crate::registry::{Instance, InstanceId};

/// True when an instance may receive traffic.
pub fn is_eligible(instance: &Instance, view: &InstanceHealthView, threshold: f64) -> bool {
    instance.active && view.effective_health(instance) > threshold
}

/// Stateful selector. The only mutable state is the rotation cursor.
#[derive(Debug, Default)]
pub struct Selector {
    cursor: AtomicUsize,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rotation cursor.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Next instance in rotation, or `None` when nothing qualifies.
    pub fn select_next(
        &self,
        instances: &[Arc<Instance>],
        view: &InstanceHealthView,
        threshold: f64,
    ) -> Option<Arc<Instance>> {
        let eligible: Vec<&Arc<Instance>> = instances
            .iter()
            .filter(|i| is_eligible(i, view, threshold))
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let len = eligible.len();
        // Advance atomically against this call's list length.
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        let next = (previous + 1) % len;

        Some(eligible[next].clone())
    }

    /// Healthiest eligible instance other than `excluding`.
    pub fn select_best(
        instances: &[Arc<Instance>],
        view: &InstanceHealthView,
        threshold: f64,
        excluding: Option<&InstanceId>,
    ) -> Option<Arc<Instance>> {
        let mut best: Option<(&Arc<Instance>, f64)> = None;

        for instance in instances {
            if Some(&instance.id) == excluding || !instance.active {
                continue;
            }
            let health = view.effective_health(instance);
            if health <= threshold {
                continue;
            }
            // Strictly greater keeps the first of equal scores.
            if best.map_or(true, |(_, h)| health > h) {
                best = Some((instance, health));
            }
        }

        best.map(|(instance, _)| instance.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthObservation, HealthStatus};
    use std::collections::HashSet;

    fn instances(scores: &[(&str, f64)]) -> Vec<Arc<Instance>> {
        scores
            .iter()
            .map(|(id, s)| Arc::new(Instance::new(*id, format!("http://{}", id), *s)))
            .collect()
    }

    fn observe(view: &InstanceHealthView, id: &str, score: f64) {
        view.set(HealthObservation::new(InstanceId::from(id), HealthStatus::Score(score)));
    }

    #[test]
    fn test_round_robin_visits_each_once() {
        let selector = Selector::new();
        let view = InstanceHealthView::new();
        let pool = instances(&[("a", 90.0), ("b", 80.0), ("c", 20.0), ("d", 70.0)]);

        let picks: Vec<_> = (0..3)
            .map(|_| selector.select_next(&pool, &view, 50.0).unwrap().id.clone())
            .collect();
        let unique: HashSet<_> = picks.iter().cloned().collect();
        assert_eq!(unique.len(), 3);
        assert!(!unique.contains(&InstanceId::from("c")));

        // Fourth call wraps around to the first pick.
        let again = selector.select_next(&pool, &view, 50.0).unwrap();
        assert_eq!(again.id, picks[0]);
    }

    #[test]
    fn test_first_pick_advances_from_zero() {
        let selector = Selector::new();
        let view = InstanceHealthView::new();
        let pool = instances(&[("a", 90.0), ("b", 90.0)]);

        assert_eq!(selector.select_next(&pool, &view, 50.0).unwrap().id.as_str(), "b");
        assert_eq!(selector.select_next(&pool, &view, 50.0).unwrap().id.as_str(), "a");
        assert_eq!(selector.cursor(), 0);
    }

    #[test]
    fn test_shrinking_list_stays_in_bounds() {
        let selector = Selector::new();
        let view = InstanceHealthView::new();
        let pool = instances(&[("a", 90.0), ("b", 90.0), ("c", 90.0), ("d", 90.0)]);

        for _ in 0..3 {
            selector.select_next(&pool, &view, 50.0);
        }
        assert_eq!(selector.cursor(), 3);

        observe(&view, "a", 0.0);
        observe(&view, "c", 10.0);
        observe(&view, "d", 40.0);

        let pick = selector.select_next(&pool, &view, 50.0).unwrap();
        assert_eq!(pick.id.as_str(), "b");
    }

    #[test]
    fn test_failed_probe_excludes_instance() {
        let selector = Selector::new();
        let view = InstanceHealthView::new();
        let pool = instances(&[("a", 70.0)]);

        assert!(selector.select_next(&pool, &view, 50.0).is_some());
        view.set(HealthObservation::unreachable(InstanceId::from("a")));
        assert!(selector.select_next(&pool, &view, 50.0).is_none());
    }

    #[test]
    fn test_inactive_and_threshold_boundary_excluded() {
        let selector = Selector::new();
        let view = InstanceHealthView::new();
        let pool = vec![
            Arc::new(Instance::new("a", "http://a", 95.0).with_active(false)),
            Arc::new(Instance::new("b", "http://b", 50.0)),
        ];
        assert!(selector.select_next(&pool, &view, 50.0).is_none());
        assert!(Selector::select_best(&pool, &view, 50.0, None).is_none());
    }

    #[test]
    fn test_select_best_prefers_highest_live_score() {
        let view = InstanceHealthView::new();
        let pool = instances(&[("a", 30.0), ("b", 60.0), ("c", 95.0), ("d", 80.0)]);
        observe(&view, "c", 55.0);

        let best = Selector::select_best(&pool, &view, 50.0, Some(&InstanceId::from("a"))).unwrap();
        assert_eq!(best.id.as_str(), "d");
    }

    #[test]
    fn test_select_best_excludes_and_breaks_ties_by_order() {
        let view = InstanceHealthView::new();
        let pool = instances(&[("a", 90.0), ("b", 75.0), ("c", 75.0)]);

        let best = Selector::select_best(&pool, &view, 50.0, Some(&InstanceId::from("a"))).unwrap();
        assert_eq!(best.id.as_str(), "b");
    }
}
