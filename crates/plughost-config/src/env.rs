//! Environment variable handling.

/// Environment variable names read by the command line.
pub mod vars {
    pub const PLUGHOST_PLUGIN: &str = "PLUGHOST_PLUGIN";
    pub const PLUGHOST_PORT: &str = "PLUGHOST_PORT";
    pub const PLUGHOST_BIND: &str = "PLUGHOST_BIND";
    pub const PLUGHOST_MOUNT: &str = "PLUGHOST_MOUNT";
    pub const PLUGHOST_CONFIG: &str = "PLUGHOST_CONFIG";
    pub const PLUGHOST_ATTACH_STRING: &str = "PLUGHOST_ATTACH_STRING";
    pub const PLUGHOST_REQUEST_TIMEOUT: &str = "PLUGHOST_REQUEST_TIMEOUT";
    pub const PLUGHOST_DESCRIPTOR_TIMEOUT: &str = "PLUGHOST_DESCRIPTOR_TIMEOUT";
    pub const PLUGHOST_VERBOSE: &str = "PLUGHOST_VERBOSE";
}

/// Process environment loaded from `.env` files.
pub struct Environment {
    _guard: (), // Prevent construction outside module
}

impl Environment {
    /// Load `.env` then `.env.local`; values already set in the process win.
    pub fn init() -> Self {
        let _ = dotenvy::from_filename(".env");
        let _ = dotenvy::from_filename(".env.local");
        Self { _guard: () }
    }
}
