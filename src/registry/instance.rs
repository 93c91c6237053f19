//! Model-serving instance as published by the registry.
//!
//! # Responsibilities
//! - Represent one independently deployed model-serving instance
//! - Carry the registry-advertised health score used before any live check
//! - Keep model metadata opaque to routing

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::health::observation::MAX_HEALTH;

/// Opaque instance identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Model metadata. Routing never inspects these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetadata {
    pub instance_name: Option<String>,
    pub model_provider: Option<String>,
    pub model_name: Option<String>,
    pub version: Option<String>,
    pub container_version: Option<String>,
    pub registered_at: Option<String>,
    pub last_health_check: Option<String>,
    pub model_parameters: Option<serde_json::Value>,
}

/// A single model-serving instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Registry identity.
    pub id: InstanceId,
    /// Whether the registry allows traffic to this instance.
    #[serde(rename = "is_active", alias = "active")]
    pub active: bool,
    /// Last health score advertised by the registry, 0..=100.
    #[serde(rename = "health_score", alias = "advertised_health")]
    pub advertised_health: f64,
    /// Base address probes and chat traffic are sent to.
    pub host_address: String,
    #[serde(flatten)]
    pub metadata: ModelMetadata,
}

impl Instance {
    /// Create an instance with empty metadata.
    pub fn new(
        id: impl Into<InstanceId>,
        host_address: impl Into<String>,
        advertised_health: f64,
    ) -> Self {
        Self {
            id: id.into(),
            active: true,
            advertised_health,
            host_address: host_address.into(),
            metadata: ModelMetadata::default(),
        }
    }

    /// Builder-style toggle for the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Drop entries routing cannot use safely: repeated ids (the first one wins)
/// and advertised scores outside 0..=100.
pub fn sanitize_snapshot(instances: Vec<Instance>) -> Vec<Instance> {
    let mut seen = HashSet::new();
    instances
        .into_iter()
        .filter(|instance| {
            let health = instance.advertised_health;
            if !health.is_finite() || !(0.0..=MAX_HEALTH).contains(&health) {
                tracing::warn!(instance = %instance.id, health, "Dropping instance with out-of-range health score");
                return false;
            }
            if !seen.insert(instance.id.clone()) {
                tracing::warn!(
                    instance = %instance.id,
                    host = %instance.host_address,
                    "Dropping duplicate instance id"
                );
                return false;
            }
            true
        })
        .collect()
}
