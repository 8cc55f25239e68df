//! Plugin bridge for plughost.
//!
//! Obtains a live [`Backend`](plughost_core::Backend) from an out-of-process
//! plugin and manages its lifecycle:
//!
//! - [`Descriptor`]: the `version|protocol|network|address|wire|` token a
//!   plugin prints to announce where it listens
//! - [`launch`]: spawning a plugin and capturing its descriptor
//! - [`rpc`]: newline-delimited JSON frames over a unix socket or tcp
//! - [`ProtocolRegistry`]: capability factories keyed by protocol version
//! - [`RemoteBackend`]: the `Backend` implementation that forwards over RPC
//! - [`PluginHost`]: the `Idle → Starting → Running → Stopping` lifecycle
//! - [`serve`]: the plugin side of the same protocol

pub mod descriptor;
pub mod error;
pub mod host;
pub mod launch;
pub mod registry;
pub mod remote;
pub mod rpc;
pub mod serve;

pub use descriptor::{Descriptor, Network, WireProtocol};
pub use error::{BridgeError, DescriptorError, RpcError};
pub use host::{HostOptions, HostState, PluginHost, PluginSource};
pub use launch::{LaunchState, PluginProcess};
pub use registry::{HandshakeConfig, ProtocolRegistry, BACKEND_CAPABILITY, BACKEND_INTERFACE, HANDSHAKE};
pub use remote::{HostCallbacks, RemoteBackend};
pub use serve::{serve, PluginServer, ServeConfig};
