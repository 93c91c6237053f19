//! Health observation schema.
//!
//! One observation is produced per probe. Only the latest observation per
//! instance is kept; there is no history.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::registry::InstanceId;

/// Upper bound of the health scale.
pub const MAX_HEALTH: f64 = 100.0;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Result of a single health check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "score", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Score reported by the instance, 0..=100.
    Score(f64),
    /// Probe failed (transport error, timeout, bad status or bad body).
    Unreachable,
}

impl HealthStatus {
    /// Numeric value; unreachable counts as zero.
    pub fn value(&self) -> f64 {
        match self {
            HealthStatus::Score(score) => *score,
            HealthStatus::Unreachable => 0.0,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, HealthStatus::Score(_))
    }
}

/// Optional metrics an instance may attach to its health response. Each
/// field may be missing; only the `health` value decides the observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProbeMetrics {
    pub latency: Option<f64>,
    pub error_rate: Option<f64>,
    pub success_rate: Option<f64>,
}

/// Latest known health of one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthObservation {
    pub instance_id: InstanceId,
    pub status: HealthStatus,
    /// Local time the probe finished.
    pub observed_at: SystemTime,
    /// Timestamp string reported by the instance, if any.
    pub reported_at: Option<String>,
    pub metrics: Option<ProbeMetrics>,
    /// Process-wide, strictly increasing. Lets consumers that receive the
    /// same observation twice apply it once.
    pub sequence: u64,
}

impl HealthObservation {
    /// A fresh observation stamped with the next sequence number.
    pub fn new(instance_id: InstanceId, status: HealthStatus) -> Self {
        Self {
            instance_id,
            status,
            observed_at: SystemTime::now(),
            reported_at: None,
            metrics: None,
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn unreachable(instance_id: InstanceId) -> Self {
        Self::new(instance_id, HealthStatus::Unreachable)
    }

    pub fn score(&self) -> f64 {
        self.status.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_counts_as_zero() {
        let obs = HealthObservation::unreachable(InstanceId::from("a"));
        assert_eq!(obs.score(), 0.0);
        assert!(!obs.status.is_reachable());
    }

    #[test]
    fn test_sequence_increases() {
        let first = HealthObservation::new(InstanceId::from("a"), HealthStatus::Score(10.0));
        let second = HealthObservation::new(InstanceId::from("a"), HealthStatus::Score(20.0));
        assert!(second.sequence > first.sequence);
    }
}
