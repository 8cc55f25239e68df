//! Handshake identity and the capability factories keyed by protocol version.

use crate::error::BridgeError;
use crate::remote::{HostCallbacks, RemoteBackend};
use crate::rpc::RpcPeer;
use plughost_core::BackendRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name under which the backend capability is dispensed.
pub const BACKEND_CAPABILITY: &str = "backend";

/// Interface a dispensed backend capability must report.
pub const BACKEND_INTERFACE: &str = "logical.Backend";

/// Identity both sides check before any other call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub protocol_version: u32,
    pub magic_cookie_key: &'static str,
    pub magic_cookie_value: &'static str,
}

/// The backend plugin handshake.
pub const HANDSHAKE: HandshakeConfig = HandshakeConfig {
    protocol_version: 4,
    magic_cookie_key: "VAULT_BACKEND_PLUGIN",
    magic_cookie_value: "6669da05-b1c8-4f49-97d9-c8e5bed98e20",
};

/// Handshake call parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeParams {
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
    /// Versions the host can speak.
    pub protocol_versions: Vec<u32>,
    pub wire: String,
}

/// Handshake answer: the version the plugin settled on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeReply {
    pub protocol_version: u32,
}

/// Dispense call parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispenseParams {
    pub name: String,
}

/// Dispense answer: the interface the dispensed object implements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispenseReply {
    pub interface: String,
}

/// Builds the local handle for a dispensed capability.
pub trait CapabilityFactory: Send + Sync {
    /// Interface the remote object has to report.
    fn interface(&self) -> &'static str;

    /// Wrap the connection in a backend handle.
    fn build(&self, peer: Arc<RpcPeer>, callbacks: Arc<HostCallbacks>) -> BackendRef;
}

/// Factory for [`RemoteBackend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendFactory;

impl CapabilityFactory for BackendFactory {
    fn interface(&self) -> &'static str {
        BACKEND_INTERFACE
    }

    fn build(&self, peer: Arc<RpcPeer>, callbacks: Arc<HostCallbacks>) -> BackendRef {
        Arc::new(RemoteBackend::new(peer, callbacks))
    }
}

/// Capabilities available at one protocol version.
#[derive(Clone, Default)]
pub struct PluginSet {
    capabilities: BTreeMap<&'static str, Arc<dyn CapabilityFactory>>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, factory: Arc<dyn CapabilityFactory>) -> Self {
        self.capabilities.insert(name, factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CapabilityFactory>> {
        self.capabilities.get(name)
    }
}

impl fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.capabilities.keys()).finish()
    }
}

/// Plugin sets keyed by negotiated protocol version.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    sets: BTreeMap<u32, PluginSet>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions 3, 4 and 5, each dispensing a `backend`.
    pub fn backend() -> Self {
        let factory: Arc<dyn CapabilityFactory> = Arc::new(BackendFactory);
        [3, 4, 5].into_iter().fold(Self::new(), |registry, version| {
            registry.with_version(version, PluginSet::new().with(BACKEND_CAPABILITY, factory.clone()))
        })
    }

    pub fn with_version(mut self, version: u32, set: PluginSet) -> Self {
        self.sets.insert(version, set);
        self
    }

    /// Supported versions, ascending.
    pub fn versions(&self) -> Vec<u32> {
        self.sets.keys().copied().collect()
    }

    /// The plugin set for a negotiated version.
    pub fn plugin_set(&self, version: u32) -> Result<&PluginSet, BridgeError> {
        self.sets
            .get(&version)
            .ok_or(BridgeError::UnsupportedVersion(version))
    }
}
