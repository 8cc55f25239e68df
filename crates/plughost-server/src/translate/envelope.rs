//! Vault-shaped response envelopes.

use super::lease::LeaseRecord;
use chrono::{DateTime, Utc};
use plughost_core::{Auth, LogicalResponse, Secret};
use serde::Serialize;
use serde_json::{Map, Value};

/// Body returned for a forwarded request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewable: Option<bool>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Always `null`; responses are never wrapped.
    pub wrap_info: Option<Value>,
    pub mount_type: String,
}

impl Envelope {
    /// An envelope with only the stamped fields.
    pub fn empty(mount: &str) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            lease_id: None,
            renewable: None,
            lease_duration: None,
            data: None,
            secret: None,
            auth: None,
            warnings: Vec::new(),
            wrap_info: None,
            mount_type: mount.trim_start_matches('/').to_string(),
        }
    }

    /// Wrap a backend response.
    pub fn from_response(response: LogicalResponse, mount: &str) -> Self {
        let now = Utc::now();
        Self {
            data: response.data,
            secret: response.secret,
            auth: response.auth.map(|auth| AuthView::mock(&auth, now)),
            warnings: response.warnings,
            ..Self::empty(mount)
        }
    }

    /// Advertise the lease minted for this response.
    pub fn with_lease(mut self, lease: &LeaseRecord) -> Self {
        self.lease_id = Some(lease.lease_id.clone());
        self.lease_duration = Some(lease.duration.as_secs());
        self.renewable = Some(lease.renewable);
        self
    }
}

/// Authentication block with a mock token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthView {
    pub client_token: String,
    pub accessor: String,
    pub policies: Vec<String>,
    pub metadata: Map<String, Value>,
    pub lease_duration: u64,
    pub renewable: bool,
}

impl AuthView {
    pub fn mock(auth: &Auth, now: DateTime<Utc>) -> Self {
        Self {
            client_token: format!("mock-token-{}", now.format("%Y%m%d%H%M%S")),
            accessor: "mock-accessor".to_string(),
            policies: auth.policies.clone(),
            metadata: auth.metadata.clone(),
            lease_duration: auth.ttl.as_secs(),
            renewable: auth.renewable,
        }
    }
}

/// Body returned by a successful renewal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenewResponse {
    pub lease_id: String,
    pub lease_duration: u64,
    pub renewable: bool,
    pub data: Map<String, Value>,
}
