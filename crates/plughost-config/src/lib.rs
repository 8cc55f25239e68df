//! Configuration for plughost.
//!
//! - [`parse_plugin_config`] turns the free-form `--config` string into the
//!   flat map handed to the plugin's setup call.
//! - [`HostArgs`] is the command line, [`HostConfig`] the validated result.
//! - [`parse_duration`] reads durations such as `90s` or `1h30m`.

pub mod duration;
pub mod env;
pub mod plugin;
pub mod types;
pub mod validation;

pub use duration::parse_duration;
pub use env::Environment;
pub use plugin::parse_plugin_config;
pub use types::{HostArgs, HostConfig, LaunchMode};
pub use validation::{validate_config, ConfigError};
