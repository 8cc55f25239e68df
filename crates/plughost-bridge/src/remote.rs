//! Host side of the backend protocol.
//!
//! [`RemoteBackend`] turns [`Backend`] calls into RPC calls; [`HostCallbacks`]
//! serves the storage and system view callbacks the plugin makes meanwhile.

use crate::error::RpcError;
use crate::rpc::{methods, Dispatcher, ErrorBody, RpcPeer, INVALID_PARAMS, UNKNOWN_METHOD};
use async_trait::async_trait;
use parking_lot::RwLock;
use plughost_core::{
    Backend, BackendConfig, BackendError, BackendResult, InitializationRequest, LogicalRequest,
    LogicalResponse, Storage, StorageEntry, StorageError, SystemView,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SetupParams {
    pub backend_uuid: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct KeyParams {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PrefixParams {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EntryParams {
    pub entry: StorageEntry,
}

/// Arguments of a `system.*` callback; each method reads the fields it needs.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct SystemArgs {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub policy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audience: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub job: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    /// Seconds.
    #[serde(default)]
    pub ttl: u64,
}

pub(crate) fn error_body(err: &BackendError) -> ErrorBody {
    ErrorBody::new(err.code(), err.to_string())
}

pub(crate) fn decode<T: DeserializeOwned>(params: Value) -> Result<T, ErrorBody> {
    serde_json::from_value(params).map_err(|e| ErrorBody::new(INVALID_PARAMS, e.to_string()))
}

pub(crate) fn encode<T: Serialize>(value: T) -> Result<Value, ErrorBody> {
    serde_json::to_value(value).map_err(|e| ErrorBody::new(INVALID_PARAMS, e.to_string()))
}

/// Storage and system view the plugin's callbacks are served from.
///
/// Both are bound by `setup`; a callback arriving earlier is refused.
#[derive(Default)]
pub struct HostCallbacks {
    storage: RwLock<Option<Arc<dyn Storage>>>,
    system: RwLock<Option<Arc<dyn SystemView>>>,
}

impl HostCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_storage(&self, storage: Arc<dyn Storage>) {
        *self.storage.write() = Some(storage);
    }

    pub fn bind_system(&self, system: Arc<dyn SystemView>) {
        *self.system.write() = Some(system);
    }

    fn storage(&self) -> Result<Arc<dyn Storage>, ErrorBody> {
        self.storage
            .read()
            .clone()
            .ok_or_else(|| ErrorBody::new("storage", "storage not configured"))
    }

    fn system(&self) -> Result<Arc<dyn SystemView>, ErrorBody> {
        self.system
            .read()
            .clone()
            .ok_or_else(|| error_body(&BackendError::NotImplemented))
    }

    async fn storage_call(&self, method: &str, params: Value) -> Result<Value, ErrorBody> {
        let storage = self.storage()?;
        let storage_err = |e: StorageError| error_body(&BackendError::Storage(e));
        match method {
            methods::STORAGE_LIST => {
                let PrefixParams { prefix } = decode(params)?;
                encode(storage.list(&prefix).await.map_err(storage_err)?)
            }
            methods::STORAGE_GET => {
                let KeyParams { key } = decode(params)?;
                encode(storage.get(&key).await.map_err(storage_err)?)
            }
            methods::STORAGE_PUT => {
                let EntryParams { entry } = decode(params)?;
                storage.put(entry).await.map_err(storage_err)?;
                Ok(Value::Null)
            }
            methods::STORAGE_DELETE => {
                let KeyParams { key } = decode(params)?;
                storage.delete(&key).await.map_err(storage_err)?;
                Ok(Value::Null)
            }
            other => Err(ErrorBody::new(UNKNOWN_METHOD, format!("unknown method: {other}"))),
        }
    }

    async fn system_call(&self, name: &str, params: Value) -> Result<Value, ErrorBody> {
        let system = self.system()?;
        let args: SystemArgs = if params.is_null() {
            SystemArgs::default()
        } else {
            decode(params)?
        };
        let failed = |e: BackendError| error_body(&e);

        match name {
            "default_lease_ttl" => Ok(json!(system.default_lease_ttl().await.as_secs())),
            "max_lease_ttl" => Ok(json!(system.max_lease_ttl().await.as_secs())),
            "sudo_privilege" => Ok(json!(system.sudo_privilege(&args.path, &args.token).await)),
            "tainted" => Ok(json!(system.tainted().await)),
            "caching_disabled" => Ok(json!(system.caching_disabled().await)),
            "local_mount" => Ok(json!(system.local_mount().await)),
            "mlock_enabled" => Ok(json!(system.mlock_enabled().await)),
            "replication_state" => encode(system.replication_state().await),
            "has_feature" => Ok(json!(system.has_feature(&args.feature).await)),
            "plugin_env" => encode(system.plugin_env().await.map_err(failed)?),
            "cluster_id" => encode(system.cluster_id().await.map_err(failed)?),
            "version" => encode(system.version().await.map_err(failed)?),
            "response_wrap_data" => system
                .response_wrap_data(args.data, Duration::from_secs(args.ttl))
                .await
                .map_err(failed),
            "lookup_plugin" => system.lookup_plugin(&args.name).await.map_err(failed),
            "entity_info" => system.entity_info(&args.entity_id).await.map_err(failed),
            "groups_for_entity" => encode(system.groups_for_entity(&args.entity_id).await.map_err(failed)?),
            "generate_password_from_policy" => {
                encode(system.generate_password_from_policy(&args.policy).await.map_err(failed)?)
            }
            "generate_identity_token" => {
                encode(system.generate_identity_token(&args.audience).await.map_err(failed)?)
            }
            "register_rotation_job" => encode(system.register_rotation_job(args.job).await.map_err(failed)?),
            "deregister_rotation_job" => {
                system.deregister_rotation_job(&args.job_id).await.map_err(failed)?;
                Ok(Value::Null)
            }
            other => Err(ErrorBody::new(
                UNKNOWN_METHOD,
                format!("unknown method: system.{other}"),
            )),
        }
    }
}

#[async_trait]
impl Dispatcher for HostCallbacks {
    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, ErrorBody> {
        debug!(method, "plugin callback");
        match method.strip_prefix(methods::SYSTEM_PREFIX) {
            Some(name) => self.system_call(name, params).await,
            None => self.storage_call(method, params).await,
        }
    }
}

/// A backend living in another process.
pub struct RemoteBackend {
    peer: Arc<RpcPeer>,
    callbacks: Arc<HostCallbacks>,
}

impl RemoteBackend {
    pub fn new(peer: Arc<RpcPeer>, callbacks: Arc<HostCallbacks>) -> Self {
        Self { peer, callbacks }
    }

    async fn call(&self, method: &str, params: Value) -> BackendResult<Value> {
        self.peer
            .call(method, params)
            .await
            .map_err(RpcError::into_backend)
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn setup(&self, config: BackendConfig) -> BackendResult<()> {
        self.callbacks.bind_storage(config.storage);
        self.callbacks.bind_system(config.system);
        let params = SetupParams {
            backend_uuid: config.backend_uuid,
            config: config.config,
        };
        let params = serde_json::to_value(params).map_err(|e| BackendError::Transport(e.to_string()))?;
        self.call(methods::SETUP, params).await.map(|_| ())
    }

    async fn initialize(&self, request: InitializationRequest) -> BackendResult<()> {
        self.callbacks.bind_storage(request.storage);
        self.call(methods::INITIALIZE, Value::Null).await.map(|_| ())
    }

    async fn handle_request(&self, request: LogicalRequest) -> BackendResult<Option<LogicalResponse>> {
        if let Some(storage) = request.storage.clone() {
            self.callbacks.bind_storage(storage);
        }
        let params = serde_json::to_value(&request).map_err(|e| BackendError::Transport(e.to_string()))?;
        match self.call(methods::HANDLE_REQUEST, params).await? {
            Value::Null => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| BackendError::Transport(format!("invalid response: {e}"))),
        }
    }

    async fn invalidate_key(&self, key: &str) {
        if let Err(e) = self.call(methods::INVALIDATE_KEY, json!({ "key": key })).await {
            warn!(key, error = %e, "invalidate_key failed");
        }
    }

    async fn cleanup(&self) {
        if let Err(e) = self.call(methods::CLEANUP, Value::Null).await {
            warn!(error = %e, "cleanup failed");
        }
    }
}
