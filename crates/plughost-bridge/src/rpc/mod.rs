//! Newline-delimited JSON RPC between host and plugin.
//!
//! Both ends run an [`RpcPeer`]: either side may issue calls, and inbound
//! calls are served by a [`Dispatcher`]. The host issues the lifecycle
//! methods in [`methods`]; the plugin calls back into `storage.*` and
//! `system.*` while it handles a request.

mod frame;
mod peer;
pub mod transport;

pub use frame::{ErrorBody, Frame, RequestFrame, ResponseFrame};
pub use peer::{Dispatcher, RpcPeer};

/// Method names used on the wire.
pub mod methods {
    pub const HANDSHAKE: &str = "handshake";
    pub const DISPENSE: &str = "dispense";
    pub const SETUP: &str = "setup";
    pub const INITIALIZE: &str = "initialize";
    pub const HANDLE_REQUEST: &str = "handle_request";
    pub const INVALIDATE_KEY: &str = "invalidate_key";
    pub const CLEANUP: &str = "cleanup";

    pub const STORAGE_LIST: &str = "storage.list";
    pub const STORAGE_GET: &str = "storage.get";
    pub const STORAGE_PUT: &str = "storage.put";
    pub const STORAGE_DELETE: &str = "storage.delete";

    /// Prefix of the system view callbacks, e.g. `system.default_lease_ttl`.
    pub const SYSTEM_PREFIX: &str = "system.";
}

/// Error code for a method the peer does not serve.
pub const UNKNOWN_METHOD: &str = "unknown_method";
/// Error code for parameters that do not decode.
pub const INVALID_PARAMS: &str = "invalid_params";
