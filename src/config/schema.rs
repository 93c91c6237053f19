//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::registry::Instance;

/// Root configuration for the model router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Selection and failover settings.
    pub routing: RoutingConfig,

    /// Instance registry settings.
    pub registry: RegistryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Read-only admin API.
    pub admin: AdminConfig,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Interval between checks of one instance, in milliseconds.
    pub interval_ms: u64,

    /// Per-check timeout in milliseconds. Must be below `interval_ms`.
    pub timeout_ms: u64,

    /// Path probed on each instance. `{id}` is replaced with the instance id.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
            timeout_ms: 5_000,
            path: "/health/{id}".to_string(),
        }
    }
}

/// Selection and failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Instances must score strictly above this to receive traffic.
    pub health_threshold: f64,

    /// Consecutive sub-threshold observations before failing over.
    pub max_failures: u32,

    /// Round-robin rotation period in milliseconds.
    pub rotation_interval_ms: u64,

    /// How often the failover path re-reads the shared health view.
    pub failover_poll_interval_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            health_threshold: 50.0,
            max_failures: 3,
            rotation_interval_ms: 60_000,
            failover_poll_interval_ms: 5_000,
        }
    }
}

/// Instance registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry endpoint. When unset, `instances` is used.
    pub url: Option<String>,

    /// Environment variable holding the registry bearer token.
    pub token_env: String,

    /// Poll period in milliseconds.
    pub poll_interval_ms: u64,

    /// Registry request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Upper bound for the retry backoff after failed polls.
    pub max_backoff_ms: u64,

    /// Statically declared instances.
    pub instances: Vec<Instance>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            token_env: "REGISTRY_TOKEN".to_string(),
            poll_interval_ms: 60_000,
            timeout_ms: 10_000,
            max_backoff_ms: 30_000,
            instances: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
