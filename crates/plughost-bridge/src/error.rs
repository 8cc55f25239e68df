//! Bridge error types.

use plughost_core::BackendError;
use std::time::Duration;
use thiserror::Error;

/// A descriptor that could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("invalid descriptor format, expected 'version|maxversion|network|address|protocol|', got {0} field(s)")]
    FieldCount(usize),

    #[error("invalid {field} in descriptor: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// RPC transport and remote call failures.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connection closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid payload: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("remote error ({code}): {message}")]
    Remote { code: String, message: String },
}

impl RpcError {
    /// Convert into the error a backend caller sees.
    ///
    /// Remote errors keep their identity through the wire code; everything
    /// else is a transport failure.
    pub fn into_backend(self) -> BackendError {
        match self {
            RpcError::Remote { code, message } => BackendError::from_code(&code, message),
            other => BackendError::Transport(other.to_string()),
        }
    }
}

/// Errors from starting or driving a plugin.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("plugin already started")]
    AlreadyStarted,

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("failed to start plugin process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to get reattach info from plugin: no descriptor produced")]
    NoDescriptor,

    #[error("timed out after {0:?} waiting for plugin descriptor")]
    DescriptorTimeout(Duration),

    #[error("failed to connect to plugin at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("unsupported plugin protocol version {0}")]
    UnsupportedVersion(u32),

    #[error("failed to dispense plugin: {0}")]
    Dispense(#[source] RpcError),

    #[error("dispensed plugin is not a {expected} (got {actual})")]
    CapabilityMismatch { expected: String, actual: String },

    #[error("failed to setup backend: {0}")]
    Setup(#[source] BackendError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}
