//! plughost HTTP server
//!
//! Exposes one backend plugin through a Vault-shaped REST surface.
//!
//! # Architecture
//!
//! - **Routes**: `/v1/sys/*` harness endpoints, everything else forwarded
//! - **Translator**: HTTP request to logical request, lease emulation
//! - **Error**: `{"errors": [...]}` envelopes with matching status codes
//!
//! The plugin itself is owned by a [`PluginHost`]; the server only reads
//! the backend it publishes.

#![warn(clippy::all)]

pub mod error;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod translate;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use translate::Translator;

use axum::Router;
use plughost_bridge::{HostOptions, PluginHost, PluginSource};
use plughost_config::{HostConfig, LaunchMode};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Plugin host options for a validated configuration.
pub fn host_options(config: &HostConfig) -> HostOptions {
    let source = match &config.mode {
        LaunchMode::Launch { plugin } => PluginSource::Launch(plugin.clone()),
        LaunchMode::Attach { descriptor } => PluginSource::Attach(descriptor.clone()),
    };
    HostOptions {
        source,
        config: config.plugin_config.clone(),
        mount: config.mount_name().to_string(),
        descriptor_timeout: config.descriptor_timeout,
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    routes::create_router(state).layer(TraceLayer::new_for_http())
}

/// Log plugin availability, then every change to it, until the slot is
/// dropped.
pub async fn log_availability(mut running: watch::Receiver<bool>) {
    let mut available = *running.borrow_and_update();
    if !available {
        warn!("no plugin backend published; forwarded requests answer 503");
    }
    while running.changed().await.is_ok() {
        let now = *running.borrow_and_update();
        if now == available {
            continue;
        }
        available = now;
        if available {
            info!("plugin backend published");
        } else {
            warn!("plugin backend withdrawn; forwarded requests answer 503");
        }
    }
}

/// HTTP server in front of a plugin host.
pub struct Server {
    addr: SocketAddr,
    state: AppState,
}

impl Server {
    pub fn new(config: &HostConfig, host: Arc<PluginHost>) -> Self {
        Self {
            addr: config.socket_addr(),
            state: AppState::new(host, config.request_timeout, config.port),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Server listening on {}", self.addr);

        let availability = tokio::spawn(log_availability(self.state.host.slot().subscribe()));
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        availability.abort();
        served
    }

    /// Get the server's socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_core::BackendSlot;
    use plughost_test_utils::ScriptedBackend;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_host_options_from_config() {
        let mut config = HostConfig::attach("1|4|tcp|127.0.0.1:1|grpc|");
        config.mount = "/kv/".into();
        config.plugin_config = HashMap::from([("a".to_string(), "b".to_string())]);

        let options = host_options(&config);
        assert_eq!(options.source, PluginSource::Attach("1|4|tcp|127.0.0.1:1|grpc|".into()));
        assert_eq!(options.mount, "kv");
        assert_eq!(options.config["a"], "b");

        let options = host_options(&HostConfig::launch("/usr/local/bin/plugin"));
        assert_eq!(
            options.source,
            PluginSource::Launch("/usr/local/bin/plugin".into())
        );
    }

    #[tokio::test]
    async fn test_availability_log_follows_slot() {
        let slot = BackendSlot::new();
        let watcher = tokio::spawn(log_availability(slot.subscribe()));

        slot.publish(Arc::new(ScriptedBackend::new()));
        slot.clear();
        slot.publish(Arc::new(ScriptedBackend::new()));
        assert!(!watcher.is_finished());

        drop(slot);
        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .expect("watcher ends with the slot")
            .unwrap();
    }
}
