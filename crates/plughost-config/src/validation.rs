//! Configuration validation.

use crate::types::{HostConfig, LaunchMode};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config as JSON: {0}")]
    PluginConfigJson(String),

    #[error("invalid config format: expected key=value, got {0}")]
    PluginConfigPair(String),

    #[error("plugin path required when not in attach mode")]
    MissingPlugin,

    #[error("plugin binary not found at path: {}", .0.display())]
    PluginNotFound(PathBuf),

    #[error("cannot access plugin {}: {message}", .path.display())]
    PluginAccess { path: PathBuf, message: String },

    #[error("attach mode requires a plugin descriptor")]
    MissingDescriptor,

    #[error("Invalid mount path: {0}")]
    InvalidMount(String),

    #[error("Invalid port: {0}")]
    InvalidPort(u16),
}

/// Mount names reserved by the host itself.
const RESERVED_MOUNTS: &[&str] = &["sys"];

/// Mount names are one path segment of `[A-Za-z0-9_.-]`, so they can be
/// spliced into route patterns literally.
fn is_valid_mount(mount: &str) -> bool {
    !mount.is_empty()
        && mount
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Validate host configuration.
pub fn validate_config(config: &HostConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let mount = config.mount_name();
    if !is_valid_mount(mount) || RESERVED_MOUNTS.contains(&mount) {
        errors.push(ConfigError::InvalidMount(config.mount.clone()));
    }

    if config.port == 0 {
        errors.push(ConfigError::InvalidPort(0));
    }

    if let LaunchMode::Launch { plugin } = &config.mode {
        match std::fs::metadata(plugin) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => errors.push(ConfigError::PluginAccess {
                path: plugin.clone(),
                message: "not a regular file".to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                errors.push(ConfigError::PluginNotFound(plugin.clone()))
            }
            Err(e) => errors.push(ConfigError::PluginAccess {
                path: plugin.clone(),
                message: e.to_string(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
