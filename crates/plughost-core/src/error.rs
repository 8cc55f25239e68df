//! Error types shared across the backend boundary.

use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by a backend's request handling.
///
/// The variants carry a stable wire code (see [`BackendError::code`]) so an
/// error raised inside a plugin process keeps its identity when it crosses
/// the RPC boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused the request.
    #[error("permission denied")]
    PermissionDenied,

    /// The backend does not handle this operation on this path.
    #[error("unsupported operation")]
    UnsupportedOperation,

    /// No backend path matches the request.
    #[error("unsupported path")]
    UnsupportedPath,

    /// The capability exists in the contract but is not provided here.
    #[error("not implemented")]
    NotImplemented,

    /// Storage failed while serving the request.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The backend could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other backend failure.
    #[error("{0}")]
    Message(String),
}

impl BackendError {
    /// Create a free-form backend error.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Stable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::UnsupportedOperation => "unsupported_operation",
            Self::UnsupportedPath => "unsupported_path",
            Self::NotImplemented => "not_implemented",
            Self::Storage(_) => "storage",
            Self::Transport(_) => "transport",
            Self::Message(_) => "error",
        }
    }

    /// Rebuild an error from its wire code and message.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "permission_denied" => Self::PermissionDenied,
            "unsupported_operation" => Self::UnsupportedOperation,
            "unsupported_path" => Self::UnsupportedPath,
            "not_implemented" => Self::NotImplemented,
            "storage" => Self::Storage(StorageError::Backend(strip_prefix(
                &message,
                "storage error: ",
            ))),
            "transport" => Self::Transport(strip_prefix(&message, "transport error: ")),
            _ => Self::Message(message),
        }
    }
}

fn strip_prefix(message: &str, prefix: &str) -> String {
    message.strip_prefix(prefix).unwrap_or(message).to_string()
}

/// Storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The underlying store rejected the operation.
    #[error("{0}")]
    Backend(String),

    /// The entry could not be encoded or decoded.
    #[error("invalid entry: {0}")]
    Encoding(String),
}
