//! Plugin lifecycle: `Idle → Starting → Running → Stopping → Idle`.

use crate::descriptor::Descriptor;
use crate::error::BridgeError;
use crate::launch::PluginProcess;
use crate::registry::{
    DispenseParams, DispenseReply, HandshakeParams, HandshakeReply, ProtocolRegistry,
    BACKEND_CAPABILITY, HANDSHAKE,
};
use crate::remote::HostCallbacks;
use crate::rpc::{methods, transport, RpcPeer};
use parking_lot::{Mutex, RwLock};
use plughost_core::{
    BackendConfig, BackendRef, BackendSlot, InMemoryStorage, InitializationRequest, LogicalRequest,
    Operation, PathCatalog, StubSystemView, BACKEND_UUID,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`PluginHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Where the plugin comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    /// Spawn this binary.
    Launch(PathBuf),
    /// Connect using this descriptor.
    Attach(String),
}

/// Everything a host needs to start its plugin.
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub source: PluginSource,
    /// Free-form configuration for the plugin's setup call.
    pub config: HashMap<String, String>,
    /// Mount name, used for path display.
    pub mount: String,
    /// Bound on descriptor capture in launch mode.
    pub descriptor_timeout: Option<Duration>,
}

impl HostOptions {
    pub fn new(source: PluginSource) -> Self {
        Self {
            source,
            config: HashMap::new(),
            mount: "plugin".to_string(),
            descriptor_timeout: None,
        }
    }
}

struct Running {
    backend: BackendRef,
    peer: Arc<RpcPeer>,
    process: Option<PluginProcess>,
}

/// Owns one plugin and publishes its backend into a [`BackendSlot`].
pub struct PluginHost {
    options: HostOptions,
    registry: ProtocolRegistry,
    storage: Arc<InMemoryStorage>,
    system: Arc<StubSystemView>,
    slot: Arc<BackendSlot>,
    catalog: RwLock<Option<PathCatalog>>,
    state: Mutex<HostState>,
    // Held for the whole of a start or stop.
    lifecycle: tokio::sync::Mutex<Option<Running>>,
}

impl PluginHost {
    pub fn new(options: HostOptions) -> Self {
        Self {
            options,
            registry: ProtocolRegistry::backend(),
            storage: Arc::new(InMemoryStorage::new()),
            system: Arc::new(StubSystemView),
            slot: Arc::new(BackendSlot::new()),
            catalog: RwLock::new(None),
            state: Mutex::new(HostState::Idle),
            lifecycle: tokio::sync::Mutex::new(None),
        }
    }

    /// Storage shared with the plugin.
    pub fn storage(&self) -> Arc<InMemoryStorage> {
        self.storage.clone()
    }

    /// Slot the live backend is published into.
    pub fn slot(&self) -> Arc<BackendSlot> {
        self.slot.clone()
    }

    pub fn mount(&self) -> &str {
        self.options.mount.trim_matches('/')
    }

    pub fn state(&self) -> HostState {
        *self.state.lock()
    }

    /// The discovered path catalog, if the plugin provided one.
    pub fn openapi(&self) -> Option<PathCatalog> {
        self.catalog.read().clone()
    }

    /// Launch or attach, negotiate, set up and publish the backend.
    ///
    /// Every failure tears down whatever was started and leaves the host
    /// `Idle` with an empty slot.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() || self.slot.is_set() {
            return Err(BridgeError::AlreadyStarted);
        }
        self.set_state(HostState::Starting);

        let running = match self.bring_up().await {
            Ok(running) => running,
            Err(e) => {
                self.set_state(HostState::Idle);
                return Err(e);
            }
        };

        let backend = running.backend.clone();
        *lifecycle = Some(running);
        self.slot.publish(backend.clone());
        self.set_state(HostState::Running);

        info!("calling backend initialize");
        let request = InitializationRequest {
            storage: self.storage.clone(),
        };
        if let Err(e) = backend.initialize(request).await {
            error!(error = %e, "initialize failed");
        }

        info!("plugin started successfully");
        self.discover(&backend).await;
        Ok(())
    }

    /// Tear the plugin down. Does nothing when nothing is running.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };
        self.set_state(HostState::Stopping);

        info!("calling backend invalidate_key for shutdown");
        running.backend.invalidate_key("shutdown").await;
        running.backend.cleanup().await;
        running.peer.close().await;
        if let Some(process) = running.process {
            process.terminate().await;
        }

        self.slot.clear();
        self.set_state(HostState::Idle);
        info!("plugin stopped");
    }

    fn set_state(&self, state: HostState) {
        debug!(?state, "plugin host state");
        *self.state.lock() = state;
    }

    async fn bring_up(&self) -> Result<Running, BridgeError> {
        let (descriptor, process) = match &self.options.source {
            PluginSource::Launch(path) => {
                info!(plugin = %path.display(), "starting plugin process");
                let process = PluginProcess::launch(path, self.options.descriptor_timeout).await?;
                (process.descriptor().clone(), Some(process))
            }
            PluginSource::Attach(text) => {
                info!(descriptor = %text, "parsing plugin attach string");
                (Descriptor::parse(text)?, None)
            }
        };

        match self.connect(&descriptor).await {
            Ok((backend, peer)) => Ok(Running {
                backend,
                peer,
                process,
            }),
            Err(e) => {
                if let Some(process) = process {
                    process.terminate().await;
                }
                Err(e)
            }
        }
    }

    async fn connect(&self, descriptor: &Descriptor) -> Result<(BackendRef, Arc<RpcPeer>), BridgeError> {
        info!(
            address = %descriptor.address,
            network = descriptor.network.as_str(),
            protocol = descriptor.wire.as_str(),
            version = descriptor.protocol_version,
            "connecting to plugin"
        );
        let (reader, writer) = transport::connect(descriptor.network, &descriptor.address)
            .await
            .map_err(|source| BridgeError::Connect {
                address: descriptor.address.clone(),
                source,
            })?;

        let callbacks = Arc::new(HostCallbacks::new());
        let peer = RpcPeer::new(writer);
        peer.start(reader, callbacks.clone());

        match self.negotiate(descriptor, &peer, callbacks).await {
            Ok(backend) => Ok((backend, peer)),
            Err(e) => {
                peer.close().await;
                Err(e)
            }
        }
    }

    async fn negotiate(
        &self,
        descriptor: &Descriptor,
        peer: &Arc<RpcPeer>,
        callbacks: Arc<HostCallbacks>,
    ) -> Result<BackendRef, BridgeError> {
        let params = HandshakeParams {
            magic_cookie_key: HANDSHAKE.magic_cookie_key.to_string(),
            magic_cookie_value: HANDSHAKE.magic_cookie_value.to_string(),
            protocol_versions: self.registry.versions(),
            wire: descriptor.wire.as_str().to_string(),
        };
        let reply: HandshakeReply = peer
            .call_as(methods::HANDSHAKE, &params)
            .await
            .map_err(|e| BridgeError::Handshake(e.to_string()))?;
        if reply.protocol_version != descriptor.protocol_version {
            warn!(
                announced = descriptor.protocol_version,
                negotiated = reply.protocol_version,
                "plugin negotiated a different protocol version than it announced"
            );
        }

        let factory = self
            .registry
            .plugin_set(reply.protocol_version)?
            .get(BACKEND_CAPABILITY)
            .cloned()
            .ok_or(BridgeError::UnsupportedVersion(reply.protocol_version))?;

        debug!(version = reply.protocol_version, "dispensing backend plugin");
        let params = DispenseParams {
            name: BACKEND_CAPABILITY.to_string(),
        };
        let dispensed: DispenseReply = peer
            .call_as(methods::DISPENSE, &params)
            .await
            .map_err(BridgeError::Dispense)?;
        if dispensed.interface != factory.interface() {
            return Err(BridgeError::CapabilityMismatch {
                expected: factory.interface().to_string(),
                actual: dispensed.interface,
            });
        }

        let backend = factory.build(peer.clone(), callbacks);
        let config = BackendConfig {
            backend_uuid: BACKEND_UUID.to_string(),
            storage: self.storage.clone(),
            config: self.options.config.clone(),
            system: self.system.clone(),
        };
        backend.setup(config).await.map_err(BridgeError::Setup)?;
        Ok(backend)
    }

    async fn discover(&self, backend: &BackendRef) {
        let mut data = Map::new();
        data.insert("requestResponsePrefix".to_string(), Value::String(String::new()));
        let request = LogicalRequest::new(Operation::Help, "")
            .with_data(data)
            .with_storage(self.storage.clone());

        let response = match backend.handle_request(request).await {
            Ok(Some(response)) if response.data.is_some() => response,
            Ok(_) => {
                warn!("no path information available from plugin");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to get plugin paths");
                return;
            }
        };

        match PathCatalog::from_help_response(&response) {
            Ok(Some(catalog)) => {
                self.describe_paths(&catalog);
                *self.catalog.write() = Some(catalog);
            }
            Ok(None) => warn!("no OpenAPI document available from plugin"),
            Err(e) => error!(error = %e, "failed to parse OpenAPI document"),
        }
    }

    fn describe_paths(&self, catalog: &PathCatalog) {
        let paths = &catalog.document().paths;
        info!(count = paths.len(), "plugin paths discovered");
        for (path, item) in paths {
            let full = PathCatalog::mounted_path(self.mount(), path);
            info!(path = %full, operations = ?item.verbs(), "plugin path");
            if !item.description.is_empty() {
                debug!(path = %full, description = %item.description, "plugin path description");
            }
        }
    }

    /// Plain-text listing of the plugin's endpoints and the host's own.
    pub fn usage_info(&self, port: u16) -> String {
        let catalog = self.catalog.read();
        let mut info = String::from("Plugin Test Server\n\nAvailable endpoints:\n");

        if let Some(catalog) = catalog.as_ref() {
            for (path, item) in &catalog.document().paths {
                let full = PathCatalog::mounted_path(self.mount(), path);
                for (verb, op) in item.operations() {
                    let summary = if op.summary.is_empty() {
                        String::new()
                    } else {
                        format!(" - {}", op.summary)
                    };
                    let _ = writeln!(info, "  {verb:<6} {full:<40}{summary}");
                }
            }
        }

        info.push_str("\nSystem endpoints:\n");
        for (verb, path, what) in [
            ("GET", "/v1/sys/health", "Check plugin health"),
            ("GET", "/v1/sys/storage", "View storage contents"),
            ("GET", "/v1/sys/plugins/catalog/openapi", "Get OpenAPI specification"),
            ("PUT", "/v1/sys/leases/renew", "Renew a lease"),
            ("PUT", "/v1/sys/leases/revoke", "Revoke a lease"),
        ] {
            let _ = writeln!(info, "  {verb:<6} {path:<40} - {what}");
        }
        let _ = writeln!(info, "\nTry:\n  curl http://localhost:{port}/v1/{}/", self.mount());
        info
    }
}
