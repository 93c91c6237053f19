//! Single health check against one instance.
//!
//! # Responsibilities
//! - Issue one bounded-time health request
//! - Validate the response against the observation schema
//! - Turn every failure into an `Unreachable` observation
//!
//! # Design Decisions
//! - A probe never returns an error; callers always get an observation
//! - The probe does not touch shared state

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::HealthCheckConfig;
use crate::health::observation::{HealthObservation, HealthStatus, ProbeMetrics, MAX_HEALTH};
use crate::observability::metrics;
use crate::registry::Instance;

/// Performs one health check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, instance: &Instance) -> HealthObservation;
}

/// Body returned by an instance's health endpoint.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    health: f64,
    timestamp: Option<String>,
    metrics: Option<ProbeMetrics>,
}

/// HTTP health probe: `GET {host_address}{path}` with `{id}` substituted.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(config: &HealthCheckConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("model-router-health-check")
            .build()?;

        Ok(Self {
            client,
            path: config.path.clone(),
            timeout,
        })
    }

    /// Health URL for an instance.
    pub fn health_url(&self, instance: &Instance) -> String {
        let path = self.path.replace("{id}", instance.id.as_str());
        format!("{}{}", instance.host_address.trim_end_matches('/'), path)
    }

    async fn fetch(&self, url: &str) -> Result<HealthResponse, String> {
        let request = self.client.get(url).send();
        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err("timeout".to_string()),
            Ok(Err(e)) => return Err(format!("connection error: {}", e)),
            Err(_) => return Err("timeout".to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(format!("non-success status {}", status));
        }

        let body: HealthResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid body: {}", e))?;

        if !body.health.is_finite() || !(0.0..=MAX_HEALTH).contains(&body.health) {
            return Err(format!("health {} out of range", body.health));
        }
        Ok(body)
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, instance: &Instance) -> HealthObservation {
        let url = self.health_url(instance);

        match self.fetch(&url).await {
            Ok(body) => {
                if let Some(m) = &body.metrics {
                    tracing::debug!(
                        instance = %instance.id,
                        latency = ?m.latency,
                        error_rate = ?m.error_rate,
                        success_rate = ?m.success_rate,
                        "Health metrics"
                    );
                }
                metrics::record_health_check(instance.id.as_str(), "ok");
                let mut obs = HealthObservation::new(instance.id.clone(), HealthStatus::Score(body.health));
                obs.reported_at = body.timestamp;
                obs.metrics = body.metrics;
                obs
            }
            Err(reason) => {
                tracing::warn!(instance = %instance.id, url = %url, reason = %reason, "Health check failed");
                metrics::record_health_check(instance.id.as_str(), "unreachable");
                HealthObservation::unreachable(instance.id.clone())
            }
        }
    }
}
