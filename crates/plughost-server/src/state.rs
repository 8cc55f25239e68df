//! Shared handler state.

use crate::translate::Translator;
use plughost_bridge::PluginHost;
use std::sync::Arc;
use std::time::Duration;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub host: Arc<PluginHost>,
    pub translator: Arc<Translator>,
    /// Port shown in the usage text.
    pub port: u16,
}

impl AppState {
    /// Build the translator over the host's slot and storage.
    pub fn new(host: Arc<PluginHost>, request_timeout: Option<Duration>, port: u16) -> Self {
        let translator = Translator::new(host.slot(), host.storage(), host.mount())
            .with_request_timeout(request_timeout);
        Self {
            host,
            translator: Arc::new(translator),
            port,
        }
    }

    pub fn mount(&self) -> &str {
        self.translator.mount()
    }
}
