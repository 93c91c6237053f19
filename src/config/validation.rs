//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (threshold, intervals, scores)
//! - Check that addresses and URLs parse
//! - Detect duplicate static instance ids
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::health::observation::MAX_HEALTH;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be within 0..=100, got {value}")]
    ScoreOutOfRange { field: String, value: f64 },

    #[error("health_check.timeout_ms ({timeout_ms}) must be below health_check.interval_ms ({interval_ms})")]
    TimeoutNotBelowInterval { timeout_ms: u64, interval_ms: u64 },

    #[error("invalid URL in {field}: '{value}'")]
    InvalidUrl { field: String, value: String },

    #[error("invalid socket address in {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("duplicate instance id '{0}'")]
    DuplicateInstance(String),

    #[error("health_check.path must start with '/'")]
    InvalidPath,

    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyApiKey,
}

fn check_url(field: String, value: &str, errors: &mut Vec<ValidationError>) {
    match url::Url::parse(value) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

fn check_score(field: String, value: f64, errors: &mut Vec<ValidationError>) {
    if !value.is_finite() || !(0.0..=MAX_HEALTH).contains(&value) {
        errors.push(ValidationError::ScoreOutOfRange { field, value });
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let hc = &config.health_check;
    if hc.interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "health_check.interval_ms" });
    }
    if hc.timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "health_check.timeout_ms" });
    }
    if hc.interval_ms > 0 && hc.timeout_ms >= hc.interval_ms {
        errors.push(ValidationError::TimeoutNotBelowInterval {
            timeout_ms: hc.timeout_ms,
            interval_ms: hc.interval_ms,
        });
    }
    if !hc.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath);
    }

    let routing = &config.routing;
    check_score("routing.health_threshold".to_string(), routing.health_threshold, &mut errors);
    if routing.max_failures == 0 {
        errors.push(ValidationError::Zero { field: "routing.max_failures" });
    }
    if routing.rotation_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "routing.rotation_interval_ms" });
    }
    if routing.failover_poll_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "routing.failover_poll_interval_ms" });
    }

    let registry = &config.registry;
    if let Some(url) = &registry.url {
        check_url("registry.url".to_string(), url, &mut errors);
    }
    if registry.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "registry.poll_interval_ms" });
    }
    if registry.timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "registry.timeout_ms" });
    }

    let mut seen = HashSet::new();
    for instance in &registry.instances {
        if !seen.insert(instance.id.clone()) {
            errors.push(ValidationError::DuplicateInstance(instance.id.to_string()));
        }
        check_score(
            format!("registry.instances[{}].health_score", instance.id),
            instance.advertised_health,
            &mut errors,
        );
        check_url(
            format!("registry.instances[{}].host_address", instance.id),
            &instance.host_address,
            &mut errors,
        );
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: obs.metrics_address.clone(),
        });
    }
    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::EmptyApiKey);
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Instance;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RouterConfig::default();
        config.routing.health_threshold = 120.0;
        config.routing.max_failures = 0;
        config.health_check.timeout_ms = 40_000;
        config.registry.instances = vec![
            Instance::new("a", "http://a:1", 50.0),
            Instance::new("a", "not a url", 150.0),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Zero { field: "routing.max_failures" }));
        assert!(errors.contains(&ValidationError::TimeoutNotBelowInterval {
            timeout_ms: 40_000,
            interval_ms: 30_000
        }));
        assert!(errors.contains(&ValidationError::DuplicateInstance("a".to_string())));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidUrl { .. })));
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::ScoreOutOfRange { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_bad_addresses_only_checked_when_enabled() {
        let mut config = RouterConfig::default();
        config.admin.bind_address = "nope".to_string();
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_empty_admin_key_rejected_when_enabled() {
        let mut config = RouterConfig::default();
        config.admin.api_key = "  ".to_string();
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyApiKey]);
    }
}
