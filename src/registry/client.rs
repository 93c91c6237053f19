//! Registry clients.
//!
//! # Responsibilities
//! - List the instances known to the external registry
//! - Accept both the bare-array and the `{status, data}` envelope shapes
//! - Serve a static list declared in configuration

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

use crate::registry::instance::Instance;

/// Errors returned while listing instances.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transport failure or timeout.
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Registry answered with a non-success HTTP status.
    #[error("registry returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Registry answered but reported failure in its envelope.
    #[error("registry rejected request: {0}")]
    Rejected(String),

    /// Body was not a recognised instance list.
    #[error("invalid registry response: {0}")]
    Decode(String),
}

/// Source of the instance list.
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<Instance>, RegistryError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<Instance>),
    Envelope {
        status: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        data: Option<EnvelopeData>,
    },
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    instances: Vec<Instance>,
}

/// Decode a registry response body.
pub fn decode_instances(body: &str) -> Result<Vec<Instance>, RegistryError> {
    let parsed: ListResponse =
        serde_json::from_str(body).map_err(|e| RegistryError::Decode(e.to_string()))?;

    match parsed {
        ListResponse::Bare(instances) => Ok(instances),
        ListResponse::Envelope { status, message, data } => {
            if status != "success" {
                return Err(RegistryError::Rejected(
                    message.unwrap_or_else(|| format!("status '{}'", status)),
                ));
            }
            data.map(|d| d.instances)
                .ok_or_else(|| RegistryError::Decode("missing data.instances".to_string()))
        }
    }
}

/// Registry reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpRegistry {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl InstanceRegistry for HttpRegistry {
    async fn list_instances(&self) -> Result<Vec<Instance>, RegistryError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        decode_instances(&body)
    }
}

/// Instances declared in configuration. Replaced on config reload.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    instances: RwLock<Vec<Instance>>,
}

impl StaticRegistry {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self {
            instances: RwLock::new(instances),
        }
    }

    pub fn replace(&self, instances: Vec<Instance>) {
        let mut guard = self.instances.write().unwrap_or_else(|e| e.into_inner());
        *guard = instances;
    }
}

#[async_trait]
impl InstanceRegistry for StaticRegistry {
    async fn list_instances(&self) -> Result<Vec<Instance>, RegistryError> {
        let guard = self.instances.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_envelope() {
        let body = r#"{
            "status": "success",
            "data": {
                "instances": [
                    {"id": "a", "is_active": true, "health_score": 90, "host_address": "http://a"},
                    {"id": "b", "is_active": false, "health_score": 40, "host_address": "http://b"}
                ],
                "pagination": {"total": 2, "page": 1, "limit": 10, "totalPages": 1}
            }
        }"#;
        let instances = decode_instances(body).unwrap();
        assert_eq!(instances.len(), 2);
        assert!(!instances[1].active);
    }

    #[test]
    fn test_decode_bare_array() {
        let body = r#"[{"id": "a", "is_active": true, "health_score": 90, "host_address": "http://a"}]"#;
        let instances = decode_instances(body).unwrap();
        assert_eq!(instances[0].id.as_str(), "a");
    }

    #[test]
    fn test_decode_rejected() {
        let body = r#"{"status": "error", "message": "Authentication required"}"#;
        let err = decode_instances(body).unwrap_err();
        assert!(matches!(err, RegistryError::Rejected(ref m) if m == "Authentication required"));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_instances("not json"), Err(RegistryError::Decode(_))));
    }

    #[tokio::test]
    async fn test_static_registry_replace() {
        let registry = StaticRegistry::new(vec![Instance::new("a", "http://a", 50.0)]);
        assert_eq!(registry.list_instances().await.unwrap().len(), 1);

        registry.replace(vec![
            Instance::new("a", "http://a", 50.0),
            Instance::new("b", "http://b", 50.0),
        ]);
        assert_eq!(registry.list_instances().await.unwrap().len(), 2);
    }
}
