//! System capability view offered to the plugin.
//!
//! A development harness has no cluster behind it, so [`StubSystemView`]
//! answers every question with a fixed default and refuses the advanced
//! capabilities outright.

use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Replication state reported to the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationState {
    /// Replication state is not known.
    Unknown,
    /// This node is a performance primary.
    PerformancePrimary,
    /// This node is a performance secondary.
    PerformanceSecondary,
}

/// Environment details about the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEnvironment {
    /// Host version string.
    #[serde(default)]
    pub version: String,
    /// Host build date.
    #[serde(default)]
    pub build_date: String,
}

/// Questions a backend may ask about the system hosting it.
#[async_trait]
pub trait SystemView: Send + Sync {
    /// Default lease time-to-live.
    async fn default_lease_ttl(&self) -> Duration;
    /// Maximum lease time-to-live.
    async fn max_lease_ttl(&self) -> Duration;
    /// Whether the caller has sudo on the path.
    async fn sudo_privilege(&self, path: &str, token: &str) -> bool;
    /// Whether the mount is tainted.
    async fn tainted(&self) -> bool;
    /// Whether caching is disabled.
    async fn caching_disabled(&self) -> bool;
    /// Whether the mount is local-only.
    async fn local_mount(&self) -> bool;
    /// Whether mlock is enabled.
    async fn mlock_enabled(&self) -> bool;
    /// Current replication state.
    async fn replication_state(&self) -> ReplicationState;
    /// Whether a licensed feature is available.
    async fn has_feature(&self, feature: &str) -> bool;
    /// Host environment.
    async fn plugin_env(&self) -> BackendResult<PluginEnvironment>;
    /// Cluster identifier.
    async fn cluster_id(&self) -> BackendResult<String>;
    /// Host version.
    async fn version(&self) -> BackendResult<String>;
    /// Wrap response data in a single-use token.
    async fn response_wrap_data(&self, data: Map<String, Value>, ttl: Duration) -> BackendResult<Value>;
    /// Look up another registered plugin.
    async fn lookup_plugin(&self, name: &str) -> BackendResult<Value>;
    /// Identity entity details.
    async fn entity_info(&self, entity_id: &str) -> BackendResult<Value>;
    /// Groups an entity belongs to.
    async fn groups_for_entity(&self, entity_id: &str) -> BackendResult<Vec<Value>>;
    /// Generate a password from a named policy.
    async fn generate_password_from_policy(&self, policy: &str) -> BackendResult<String>;
    /// Mint an identity token.
    async fn generate_identity_token(&self, audience: &str) -> BackendResult<String>;
    /// Register a credential rotation job.
    async fn register_rotation_job(&self, job: Value) -> BackendResult<String>;
    /// Remove a credential rotation job.
    async fn deregister_rotation_job(&self, job_id: &str) -> BackendResult<()>;
}

/// Fixed-answer [`SystemView`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StubSystemView;

impl StubSystemView {
    /// Default lease TTL handed to plugins.
    pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);
    /// Maximum lease TTL handed to plugins.
    pub const MAX_LEASE_TTL: Duration = Duration::from_secs(60 * 60);
    /// Cluster identifier.
    pub const CLUSTER_ID: &'static str = "test-cluster";
    /// Version string.
    pub const VERSION: &'static str = "test-version";
}

#[async_trait]
impl SystemView for StubSystemView {
    async fn default_lease_ttl(&self) -> Duration {
        Self::DEFAULT_LEASE_TTL
    }

    async fn max_lease_ttl(&self) -> Duration {
        Self::MAX_LEASE_TTL
    }

    async fn sudo_privilege(&self, _path: &str, _token: &str) -> bool {
        false
    }

    async fn tainted(&self) -> bool {
        false
    }

    async fn caching_disabled(&self) -> bool {
        false
    }

    async fn local_mount(&self) -> bool {
        false
    }

    async fn mlock_enabled(&self) -> bool {
        false
    }

    async fn replication_state(&self) -> ReplicationState {
        ReplicationState::Unknown
    }

    async fn has_feature(&self, _feature: &str) -> bool {
        false
    }

    async fn plugin_env(&self) -> BackendResult<PluginEnvironment> {
        Ok(PluginEnvironment::default())
    }

    async fn cluster_id(&self) -> BackendResult<String> {
        Ok(Self::CLUSTER_ID.to_string())
    }

    async fn version(&self) -> BackendResult<String> {
        Ok(Self::VERSION.to_string())
    }

    async fn response_wrap_data(&self, _data: Map<String, Value>, _ttl: Duration) -> BackendResult<Value> {
        Err(BackendError::NotImplemented)
    }

    async fn lookup_plugin(&self, _name: &str) -> BackendResult<Value> {
        Err(BackendError::NotImplemented)
    }

    async fn entity_info(&self, _entity_id: &str) -> BackendResult<Value> {
        Err(BackendError::NotImplemented)
    }

    async fn groups_for_entity(&self, _entity_id: &str) -> BackendResult<Vec<Value>> {
        Err(BackendError::NotImplemented)
    }

    async fn generate_password_from_policy(&self, _policy: &str) -> BackendResult<String> {
        Err(BackendError::NotImplemented)
    }

    async fn generate_identity_token(&self, _audience: &str) -> BackendResult<String> {
        Err(BackendError::NotImplemented)
    }

    async fn register_rotation_job(&self, _job: Value) -> BackendResult<String> {
        Err(BackendError::NotImplemented)
    }

    async fn deregister_rotation_job(&self, _job_id: &str) -> BackendResult<()> {
        Err(BackendError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_defaults() {
        let view = StubSystemView;
        assert_eq!(view.default_lease_ttl().await, Duration::from_secs(30));
        assert_eq!(view.max_lease_ttl().await, Duration::from_secs(3600));
        assert!(!view.sudo_privilege("sys/mounts", "root").await);
        assert!(!view.tainted().await);
        assert!(!view.caching_disabled().await);
        assert!(!view.local_mount().await);
        assert!(!view.mlock_enabled().await);
        assert_eq!(view.replication_state().await, ReplicationState::Unknown);
        assert!(!view.has_feature("kmip").await);
        assert_eq!(view.plugin_env().await.unwrap(), PluginEnvironment::default());
        assert_eq!(view.cluster_id().await.unwrap(), "test-cluster");
        assert_eq!(view.version().await.unwrap(), "test-version");
    }

    #[tokio::test]
    async fn test_advanced_capabilities_not_implemented() {
        let view = StubSystemView;
        assert_eq!(
            view.response_wrap_data(Map::new(), Duration::from_secs(1)).await,
            Err(BackendError::NotImplemented)
        );
        assert_eq!(view.lookup_plugin("kv").await, Err(BackendError::NotImplemented));
        assert_eq!(view.entity_info("e").await, Err(BackendError::NotImplemented));
        assert_eq!(view.groups_for_entity("e").await, Err(BackendError::NotImplemented));
        assert_eq!(
            view.generate_password_from_policy("default").await,
            Err(BackendError::NotImplemented)
        );
        assert_eq!(
            view.generate_identity_token("aud").await,
            Err(BackendError::NotImplemented)
        );
        assert_eq!(
            view.register_rotation_job(Value::Null).await,
            Err(BackendError::NotImplemented)
        );
        assert_eq!(
            view.deregister_rotation_job("job").await,
            Err(BackendError::NotImplemented)
        );
    }
}
