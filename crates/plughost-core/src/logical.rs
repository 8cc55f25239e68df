//! Structured requests and responses exchanged with a backend.

use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Kind of operation a request asks the backend to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Read a value.
    Read,
    /// Create or update a value.
    Update,
    /// Delete a value.
    Delete,
    /// List keys under a path.
    List,
    /// Renew a previously issued secret.
    Renew,
    /// Revoke a previously issued secret.
    Revoke,
    /// Roll back partially applied state.
    Rollback,
    /// Rotate credentials.
    Rotate,
    /// Describe the backend's paths.
    Help,
}

impl Operation {
    /// Lower-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Renew => "renew",
            Self::Revoke => "revoke",
            Self::Rollback => "rollback",
            Self::Rotate => "rotate",
            Self::Help => "help",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "list" => Ok(Self::List),
            "renew" => Ok(Self::Renew),
            "revoke" => Ok(Self::Revoke),
            "rollback" => Ok(Self::Rollback),
            "rotate" => Ok(Self::Rotate),
            "help" => Ok(Self::Help),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// Secret payload attached to a response, and echoed back on renew/revoke.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    /// Data the backend wants returned on renew/revoke.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub internal_data: Map<String, Value>,
    /// Requested time-to-live.
    #[serde(default, with = "duration_secs")]
    pub ttl: Duration,
    /// Upper bound for renewals.
    #[serde(default, with = "duration_secs")]
    pub max_ttl: Duration,
    /// Whether the secret can be renewed.
    #[serde(default)]
    pub renewable: bool,
    /// When the secret was first issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_time: Option<DateTime<Utc>>,
}

/// Authentication payload returned by credential backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    /// Policies granted.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Arbitrary metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Token time-to-live.
    #[serde(default, with = "duration_secs")]
    pub ttl: Duration,
    /// Whether the token can be renewed.
    #[serde(default)]
    pub renewable: bool,
    /// Human readable name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
}

/// A structured request handed to a backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogicalRequest {
    /// Operation to perform.
    pub operation: Operation,
    /// Path relative to the mount, without the API version or mount segment.
    pub path: String,
    /// Decoded request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Secret being renewed or revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
    /// Storage the backend should use for this request.
    #[serde(skip)]
    pub storage: Option<Arc<dyn Storage>>,
}

impl LogicalRequest {
    /// Create a request without body or storage.
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            data: None,
            secret: None,
            storage: None,
        }
    }

    /// Attach a decoded body.
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a secret.
    pub fn with_secret(mut self, secret: Option<Secret>) -> Self {
        self.secret = secret;
        self
    }

    /// Attach the storage view.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }
}

impl fmt::Debug for LogicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalRequest")
            .field("operation", &self.operation)
            .field("path", &self.path)
            .field("data", &self.data)
            .field("secret", &self.secret)
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

/// A structured response produced by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalResponse {
    /// Response data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Secret metadata for leased data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
    /// Authentication result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    /// Non-fatal warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl LogicalResponse {
    /// Response carrying only data.
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

/// Serialise a [`Duration`] as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialise as seconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    /// Deserialise from seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
