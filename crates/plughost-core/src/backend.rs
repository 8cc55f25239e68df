//! The backend contract and the slot that publishes the live backend.

use crate::error::BackendResult;
use crate::logical::{LogicalRequest, LogicalResponse};
use crate::storage::Storage;
use crate::system::SystemView;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// One-time configuration passed to [`Backend::setup`].
#[derive(Clone)]
pub struct BackendConfig {
    /// Identifier of this backend instance.
    pub backend_uuid: String,
    /// Storage the backend persists into.
    pub storage: Arc<dyn Storage>,
    /// Parsed free-form configuration.
    pub config: HashMap<String, String>,
    /// System capability view.
    pub system: Arc<dyn SystemView>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("backend_uuid", &self.backend_uuid)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Payload for [`Backend::initialize`].
#[derive(Clone)]
pub struct InitializationRequest {
    /// Storage available during initialization.
    pub storage: Arc<dyn Storage>,
}

/// A backend able to handle structured requests.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Configure the backend. Called once before any request.
    async fn setup(&self, config: BackendConfig) -> BackendResult<()>;

    /// Run post-setup initialization.
    async fn initialize(&self, request: InitializationRequest) -> BackendResult<()>;

    /// Handle one request. `Ok(None)` means success with nothing to return.
    async fn handle_request(&self, request: LogicalRequest) -> BackendResult<Option<LogicalResponse>>;

    /// Drop any cached state for `key`.
    async fn invalidate_key(&self, key: &str);

    /// Release resources before shutdown.
    async fn cleanup(&self);
}

/// Shared handle to a backend.
pub type BackendRef = Arc<dyn Backend>;

/// Swappable, observable reference to the active backend.
///
/// The plugin host is the single writer; request handlers read through
/// [`BackendSlot::current`], which clones the reference out so the lock is
/// never held while a request is in flight.
pub struct BackendSlot {
    current: RwLock<Option<BackendRef>>,
    running: watch::Sender<bool>,
}

impl BackendSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        let (running, _) = watch::channel(false);
        Self {
            current: RwLock::new(None),
            running,
        }
    }

    /// Publish a backend, replacing any previous one in place.
    pub fn publish(&self, backend: BackendRef) {
        *self.current.write() = Some(backend);
        self.running.send_replace(true);
    }

    /// Clear the slot, returning the previous backend.
    pub fn clear(&self) -> Option<BackendRef> {
        let previous = self.current.write().take();
        self.running.send_replace(false);
        previous
    }

    /// The backend currently published, if any.
    pub fn current(&self) -> Option<BackendRef> {
        self.current.read().clone()
    }

    /// Whether a backend is published.
    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }

    /// Watch publish/clear transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }
}

impl Default for BackendSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        async fn setup(&self, _config: BackendConfig) -> BackendResult<()> {
            Ok(())
        }

        async fn initialize(&self, _request: InitializationRequest) -> BackendResult<()> {
            Ok(())
        }

        async fn handle_request(&self, _request: LogicalRequest) -> BackendResult<Option<LogicalResponse>> {
            Ok(None)
        }

        async fn invalidate_key(&self, _key: &str) {}

        async fn cleanup(&self) {}
    }

    #[test]
    fn test_slot_starts_empty() {
        let slot = BackendSlot::new();
        assert!(!slot.is_set());
        assert!(slot.current().is_none());
    }

    #[test]
    fn test_publish_then_clear() {
        let slot = BackendSlot::new();
        slot.publish(Arc::new(NullBackend));
        assert!(slot.is_set());

        let previous = slot.clear();
        assert!(previous.is_some());
        assert!(!slot.is_set());
        assert!(slot.clear().is_none());
    }

    #[test]
    fn test_publish_replaces_in_place() {
        let slot = BackendSlot::new();
        let first: BackendRef = Arc::new(NullBackend);
        let second: BackendRef = Arc::new(NullBackend);

        slot.publish(first.clone());
        slot.publish(second.clone());

        let current = slot.current().unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let slot = BackendSlot::new();
        let mut rx = slot.subscribe();
        assert!(!*rx.borrow());

        slot.publish(Arc::new(NullBackend));
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        slot.clear();
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }
}
