//! Core types for plughost.
//!
//! This crate holds the pieces shared by the plugin bridge and the HTTP
//! translator:
//!
//! - **Logical model**: [`Operation`], [`LogicalRequest`], [`LogicalResponse`]
//! - **Contracts**: the [`Backend`], [`Storage`] and [`SystemView`] traits
//! - **Collaborators**: [`InMemoryStorage`] and [`StubSystemView`]
//! - **Backend slot**: the swappable reference published on plugin start
//! - **Discovery**: the plugin's self-described path catalog

#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod logical;
pub mod openapi;
pub mod storage;
pub mod system;

pub use backend::{Backend, BackendConfig, BackendRef, BackendSlot, InitializationRequest};
pub use error::{BackendError, BackendResult, StorageError};
pub use logical::{Auth, LogicalRequest, LogicalResponse, Operation, Secret};
pub use openapi::{OasDocument, OasOperation, OasPathItem, PathCatalog};
pub use storage::{InMemoryStorage, Storage, StorageEntry};
pub use system::{PluginEnvironment, ReplicationState, StubSystemView, SystemView};

/// Fixed identifier handed to the plugin as its backend UUID.
pub const BACKEND_UUID: &str = "6669da05-b1c8-4f49-97d9-c8e5bed98e20";
