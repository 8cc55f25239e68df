//! Plugin side of the backend protocol.
//!
//! A plugin binary calls [`serve`] with its [`Backend`]: the handshake cookie
//! is checked, a listener is bound, the descriptor is printed to stdout for
//! the host to capture, and the first host connection is served until it
//! closes. Storage and system view calls made by the backend travel back to
//! the host over the same connection.

use crate::descriptor::{Descriptor, Network, WireProtocol};
use crate::error::{BridgeError, RpcError};
use crate::registry::{
    DispenseParams, DispenseReply, HandshakeParams, HandshakeReply, BACKEND_CAPABILITY,
    BACKEND_INTERFACE, HANDSHAKE,
};
use crate::remote::{decode, encode, error_body, KeyParams, SetupParams, SystemArgs};
use crate::rpc::{methods, transport, Dispatcher, ErrorBody, RpcPeer, UNKNOWN_METHOD};
use async_trait::async_trait;
use plughost_core::{
    BackendConfig, BackendError, BackendRef, BackendResult, InitializationRequest, LogicalRequest,
    PluginEnvironment, ReplicationState, Storage, StorageEntry, StorageError, SystemView,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// How a plugin listens for its host.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub network: Network,
    /// Socket path or `host:port`; a fresh temp socket or `127.0.0.1:0` when unset.
    pub address: Option<String>,
    /// Highest protocol version this plugin speaks.
    pub protocol_version: u32,
    /// Interface reported when the backend is dispensed.
    pub interface: &'static str,
    /// Refuse to run unless the handshake cookie is in the environment.
    pub require_cookie: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            network: if cfg!(unix) { Network::Unix } else { Network::Tcp },
            address: None,
            protocol_version: HANDSHAKE.protocol_version,
            interface: BACKEND_INTERFACE,
            require_cookie: true,
        }
    }
}

impl ServeConfig {
    /// Config for in-process use: no cookie check.
    pub fn embedded(network: Network) -> Self {
        Self {
            network,
            require_cookie: false,
            ..Self::default()
        }
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, PathBuf),
}

/// A bound, not yet connected, plugin endpoint.
pub struct PluginServer {
    listener: Listener,
    descriptor: Descriptor,
    config: ServeConfig,
}

impl PluginServer {
    pub async fn bind(config: ServeConfig) -> Result<Self, BridgeError> {
        if config.require_cookie {
            let value = std::env::var(HANDSHAKE.magic_cookie_key).unwrap_or_default();
            if value != HANDSHAKE.magic_cookie_value {
                return Err(BridgeError::Handshake(
                    "this binary is a plugin and is meant to be launched by its host".to_string(),
                ));
            }
        }

        let (listener, address) = match config.network {
            Network::Tcp => {
                let address = config.address.clone().unwrap_or_else(|| "127.0.0.1:0".to_string());
                let listener = TcpListener::bind(&address).await?;
                let local = listener.local_addr()?.to_string();
                (Listener::Tcp(listener), local)
            }
            #[cfg(unix)]
            Network::Unix => {
                let path = config
                    .address
                    .clone()
                    .map(PathBuf::from)
                    .unwrap_or_else(temp_socket_path);
                let listener = tokio::net::UnixListener::bind(&path)?;
                let address = path.display().to_string();
                (Listener::Unix(listener, path), address)
            }
            #[cfg(not(unix))]
            Network::Unix => {
                return Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix sockets are not available on this platform",
                )))
            }
        };

        let descriptor = Descriptor {
            core_version: 1,
            protocol_version: config.protocol_version,
            network: config.network,
            address,
            wire: WireProtocol::Grpc,
        };

        Ok(Self {
            listener,
            descriptor,
            config,
        })
    }

    /// What the host needs to reach this endpoint.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Accept one host connection and serve `backend` until it closes.
    pub async fn run(self, backend: BackendRef) -> Result<(), BridgeError> {
        let (reader, writer) = match &self.listener {
            Listener::Tcp(listener) => transport::split_tcp(listener.accept().await?.0),
            #[cfg(unix)]
            Listener::Unix(listener, _) => transport::split_unix(listener.accept().await?.0),
        };
        info!(address = %self.descriptor.address, "host connected");

        let peer = RpcPeer::new(writer);
        let dispatcher = PluginDispatcher {
            backend,
            storage: Arc::new(RemoteStorage { peer: peer.clone() }),
            system: Arc::new(RemoteSystemView { peer: peer.clone() }),
            protocol_version: self.config.protocol_version,
            interface: self.config.interface,
        };
        peer.start(reader, Arc::new(dispatcher));
        peer.closed().await;

        info!("host disconnected");
        Ok(())
    }
}

impl Drop for PluginServer {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Listener::Unix(_, path) = &self.listener {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Serve `backend` as a plugin: bind, print the descriptor, serve the host.
pub async fn serve(backend: BackendRef, config: ServeConfig) -> Result<(), BridgeError> {
    let server = PluginServer::bind(config).await?;
    println!("{}", server.descriptor());
    server.run(backend).await
}

#[cfg(unix)]
fn temp_socket_path() -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("plughost-plugin-{}-{n}.sock", std::process::id()))
}

struct PluginDispatcher {
    backend: BackendRef,
    storage: Arc<RemoteStorage>,
    system: Arc<RemoteSystemView>,
    protocol_version: u32,
    interface: &'static str,
}

impl PluginDispatcher {
    fn handshake(&self, params: HandshakeParams) -> Result<HandshakeReply, ErrorBody> {
        if params.magic_cookie_key != HANDSHAKE.magic_cookie_key
            || params.magic_cookie_value != HANDSHAKE.magic_cookie_value
        {
            return Err(ErrorBody::new("handshake", "magic cookie mismatch"));
        }
        params
            .protocol_versions
            .iter()
            .copied()
            .filter(|v| *v <= self.protocol_version)
            .max()
            .map(|protocol_version| HandshakeReply { protocol_version })
            .ok_or_else(|| {
                ErrorBody::new(
                    "handshake",
                    format!(
                        "no common protocol version (host offers {:?}, plugin speaks up to {})",
                        params.protocol_versions, self.protocol_version
                    ),
                )
            })
    }
}

#[async_trait]
impl Dispatcher for PluginDispatcher {
    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, ErrorBody> {
        let failed = |e: BackendError| error_body(&e);
        match method {
            methods::HANDSHAKE => encode(self.handshake(decode(params)?)?),
            methods::DISPENSE => {
                let DispenseParams { name } = decode(params)?;
                if name != BACKEND_CAPABILITY {
                    return Err(ErrorBody::new(UNKNOWN_METHOD, format!("unknown capability: {name}")));
                }
                encode(DispenseReply {
                    interface: self.interface.to_string(),
                })
            }
            methods::SETUP => {
                let SetupParams { backend_uuid, config } = decode(params)?;
                let config = BackendConfig {
                    backend_uuid,
                    storage: self.storage.clone(),
                    config,
                    system: self.system.clone(),
                };
                self.backend.setup(config).await.map_err(failed)?;
                Ok(Value::Null)
            }
            methods::INITIALIZE => {
                let request = InitializationRequest {
                    storage: self.storage.clone(),
                };
                self.backend.initialize(request).await.map_err(failed)?;
                Ok(Value::Null)
            }
            methods::HANDLE_REQUEST => {
                let request: LogicalRequest = decode(params)?;
                debug!(operation = %request.operation, path = %request.path, "handling request");
                let response = self
                    .backend
                    .handle_request(request.with_storage(self.storage.clone()))
                    .await
                    .map_err(failed)?;
                encode(response)
            }
            methods::INVALIDATE_KEY => {
                let KeyParams { key } = decode(params)?;
                self.backend.invalidate_key(&key).await;
                Ok(Value::Null)
            }
            methods::CLEANUP => {
                self.backend.cleanup().await;
                Ok(Value::Null)
            }
            other => Err(ErrorBody::new(UNKNOWN_METHOD, format!("unknown method: {other}"))),
        }
    }
}

/// Storage proxied to the host.
struct RemoteStorage {
    peer: Arc<RpcPeer>,
}

impl RemoteStorage {
    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, StorageError> {
        self.peer.call_as(method, &params).await.map_err(|e| match e {
            RpcError::Codec(e) => StorageError::Encoding(e.to_string()),
            RpcError::Remote { message, .. } => StorageError::Backend(
                message
                    .strip_prefix("storage error: ")
                    .unwrap_or(&message)
                    .to_string(),
            ),
            other => StorageError::Backend(other.to_string()),
        })
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.call(methods::STORAGE_LIST, json!({ "prefix": prefix })).await
    }

    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        self.call(methods::STORAGE_GET, json!({ "key": key })).await
    }

    async fn put(&self, entry: StorageEntry) -> Result<(), StorageError> {
        let _: Value = self.call(methods::STORAGE_PUT, json!({ "entry": entry })).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let _: Value = self.call(methods::STORAGE_DELETE, json!({ "key": key })).await?;
        Ok(())
    }
}

/// System view proxied to the host.
///
/// Infallible questions fall back to the conservative answer when the host
/// cannot be reached.
struct RemoteSystemView {
    peer: Arc<RpcPeer>,
}

impl RemoteSystemView {
    async fn call<R: DeserializeOwned>(&self, name: &str, args: SystemArgs) -> BackendResult<R> {
        let method = format!("{}{name}", methods::SYSTEM_PREFIX);
        self.peer
            .call_as(&method, &args)
            .await
            .map_err(RpcError::into_backend)
    }

    async fn ask<R: DeserializeOwned>(&self, name: &str, args: SystemArgs, fallback: R) -> R {
        match self.call(name, args).await {
            Ok(value) => value,
            Err(e) => {
                warn!(question = name, error = %e, "system view call failed");
                fallback
            }
        }
    }
}

#[async_trait]
impl SystemView for RemoteSystemView {
    async fn default_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.ask("default_lease_ttl", SystemArgs::default(), 0).await)
    }

    async fn max_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.ask("max_lease_ttl", SystemArgs::default(), 0).await)
    }

    async fn sudo_privilege(&self, path: &str, token: &str) -> bool {
        let args = SystemArgs {
            path: path.to_string(),
            token: token.to_string(),
            ..SystemArgs::default()
        };
        self.ask("sudo_privilege", args, false).await
    }

    async fn tainted(&self) -> bool {
        self.ask("tainted", SystemArgs::default(), false).await
    }

    async fn caching_disabled(&self) -> bool {
        self.ask("caching_disabled", SystemArgs::default(), false).await
    }

    async fn local_mount(&self) -> bool {
        self.ask("local_mount", SystemArgs::default(), false).await
    }

    async fn mlock_enabled(&self) -> bool {
        self.ask("mlock_enabled", SystemArgs::default(), false).await
    }

    async fn replication_state(&self) -> ReplicationState {
        self.ask("replication_state", SystemArgs::default(), ReplicationState::Unknown)
            .await
    }

    async fn has_feature(&self, feature: &str) -> bool {
        let args = SystemArgs {
            feature: feature.to_string(),
            ..SystemArgs::default()
        };
        self.ask("has_feature", args, false).await
    }

    async fn plugin_env(&self) -> BackendResult<PluginEnvironment> {
        self.call("plugin_env", SystemArgs::default()).await
    }

    async fn cluster_id(&self) -> BackendResult<String> {
        self.call("cluster_id", SystemArgs::default()).await
    }

    async fn version(&self) -> BackendResult<String> {
        self.call("version", SystemArgs::default()).await
    }

    async fn response_wrap_data(&self, data: Map<String, Value>, ttl: Duration) -> BackendResult<Value> {
        let args = SystemArgs {
            data,
            ttl: ttl.as_secs(),
            ..SystemArgs::default()
        };
        self.call("response_wrap_data", args).await
    }

    async fn lookup_plugin(&self, name: &str) -> BackendResult<Value> {
        let args = SystemArgs {
            name: name.to_string(),
            ..SystemArgs::default()
        };
        self.call("lookup_plugin", args).await
    }

    async fn entity_info(&self, entity_id: &str) -> BackendResult<Value> {
        let args = SystemArgs {
            entity_id: entity_id.to_string(),
            ..SystemArgs::default()
        };
        self.call("entity_info", args).await
    }

    async fn groups_for_entity(&self, entity_id: &str) -> BackendResult<Vec<Value>> {
        let args = SystemArgs {
            entity_id: entity_id.to_string(),
            ..SystemArgs::default()
        };
        self.call("groups_for_entity", args).await
    }

    async fn generate_password_from_policy(&self, policy: &str) -> BackendResult<String> {
        let args = SystemArgs {
            policy: policy.to_string(),
            ..SystemArgs::default()
        };
        self.call("generate_password_from_policy", args).await
    }

    async fn generate_identity_token(&self, audience: &str) -> BackendResult<String> {
        let args = SystemArgs {
            audience: audience.to_string(),
            ..SystemArgs::default()
        };
        self.call("generate_identity_token", args).await
    }

    async fn register_rotation_job(&self, job: Value) -> BackendResult<String> {
        let args = SystemArgs {
            job,
            ..SystemArgs::default()
        };
        self.call("register_rotation_job", args).await
    }

    async fn deregister_rotation_job(&self, job_id: &str) -> BackendResult<()> {
        let args = SystemArgs {
            job_id: job_id.to_string(),
            ..SystemArgs::default()
        };
        let _: Value = self.call("deregister_rotation_job", args).await?;
        Ok(())
    }
}
