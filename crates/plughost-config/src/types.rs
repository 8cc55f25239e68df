//! Host configuration types.

use crate::duration::parse_duration;
use crate::env::vars;
use crate::plugin::parse_plugin_config;
use crate::validation::ConfigError;
use clap::Parser;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Command line of the `plughost` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "plughost")]
#[command(about = "Run a single backend plugin behind a Vault-shaped HTTP API")]
#[command(version)]
pub struct HostArgs {
    /// Path to the plugin binary (launch mode)
    #[arg(long, env = vars::PLUGHOST_PLUGIN)]
    pub plugin: Option<PathBuf>,

    /// HTTP server port
    #[arg(long, env = vars::PLUGHOST_PORT, default_value_t = 8300)]
    pub port: u16,

    /// Address to bind the HTTP server to
    #[arg(long, env = vars::PLUGHOST_BIND, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Mount path for the plugin (under /v1/)
    #[arg(long, env = vars::PLUGHOST_MOUNT, default_value = "plugin")]
    pub mount: String,

    /// Enable verbose logging
    #[arg(short, long, env = vars::PLUGHOST_VERBOSE)]
    pub verbose: bool,

    /// Attach to a running plugin; the descriptor is read from stdin
    #[arg(long, conflicts_with = "attach_string")]
    pub attach: bool,

    /// Attach to a running plugin using this descriptor (e.g. 1|4|unix|/tmp/plugin.sock|grpc|)
    #[arg(long, env = vars::PLUGHOST_ATTACH_STRING)]
    pub attach_string: Option<String>,

    /// Plugin configuration as JSON or comma separated key=value pairs
    #[arg(long = "config", env = vars::PLUGHOST_CONFIG, default_value = "")]
    pub plugin_config: String,

    /// Give up on a backend call after this long (e.g. 30s); unbounded by default
    #[arg(long, env = vars::PLUGHOST_REQUEST_TIMEOUT, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Give up waiting for a launched plugin's descriptor after this long
    #[arg(long, env = vars::PLUGHOST_DESCRIPTOR_TIMEOUT, value_parser = parse_duration)]
    pub descriptor_timeout: Option<Duration>,
}

impl HostArgs {
    /// Whether the descriptor has to be prompted for on stdin.
    pub fn needs_prompt(&self) -> bool {
        self.attach && self.attach_string.is_none()
    }

    /// Resolve arguments into a [`HostConfig`].
    ///
    /// `prompted` is the descriptor read from stdin when `--attach` was given.
    pub fn into_config(self, prompted: Option<String>) -> Result<HostConfig, ConfigError> {
        let mode = match (self.attach_string, self.attach, prompted) {
            (Some(descriptor), _, _) => LaunchMode::Attach {
                descriptor: descriptor.trim().to_string(),
            },
            (None, true, Some(descriptor)) if !descriptor.trim().is_empty() => LaunchMode::Attach {
                descriptor: descriptor.trim().to_string(),
            },
            (None, true, _) => return Err(ConfigError::MissingDescriptor),
            (None, false, _) => {
                let plugin = self.plugin.ok_or(ConfigError::MissingPlugin)?;
                let plugin = if plugin.is_absolute() {
                    plugin
                } else {
                    std::env::current_dir()
                        .map_err(|e| ConfigError::PluginAccess {
                            path: plugin.clone(),
                            message: e.to_string(),
                        })?
                        .join(plugin)
                };
                LaunchMode::Launch { plugin }
            }
        };

        Ok(HostConfig {
            mode,
            bind: self.bind,
            port: self.port,
            mount: self.mount,
            verbose: self.verbose,
            plugin_config: parse_plugin_config(&self.plugin_config)?,
            request_timeout: self.request_timeout,
            descriptor_timeout: self.descriptor_timeout,
        })
    }
}

/// How the host obtains its plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Spawn the plugin binary and capture its descriptor.
    Launch {
        /// Absolute path of the plugin binary.
        plugin: PathBuf,
    },
    /// Connect to an already running plugin.
    Attach {
        /// Descriptor supplied by the user.
        descriptor: String,
    },
}

/// Resolved host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Launch or attach.
    pub mode: LaunchMode,
    /// HTTP bind address.
    pub bind: IpAddr,
    /// HTTP port.
    pub port: u16,
    /// Mount name under `/v1/`.
    pub mount: String,
    /// Verbose logging.
    pub verbose: bool,
    /// Configuration handed to the plugin's setup call.
    pub plugin_config: HashMap<String, String>,
    /// Optional bound on backend calls.
    pub request_timeout: Option<Duration>,
    /// Optional bound on descriptor capture.
    pub descriptor_timeout: Option<Duration>,
}

impl HostConfig {
    /// Configuration for attaching to `descriptor` with defaults elsewhere.
    pub fn attach(descriptor: impl Into<String>) -> Self {
        Self::with_mode(LaunchMode::Attach {
            descriptor: descriptor.into(),
        })
    }

    /// Configuration for launching `plugin` with defaults elsewhere.
    pub fn launch(plugin: impl Into<PathBuf>) -> Self {
        Self::with_mode(LaunchMode::Launch {
            plugin: plugin.into(),
        })
    }

    fn with_mode(mode: LaunchMode) -> Self {
        Self {
            mode,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8300,
            mount: "plugin".to_string(),
            verbose: false,
            plugin_config: HashMap::new(),
            request_timeout: None,
            descriptor_timeout: None,
        }
    }

    /// Socket address the HTTP server binds.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Mount name without surrounding slashes.
    pub fn mount_name(&self) -> &str {
        self.mount.trim_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> HostArgs {
        let mut full = vec!["plughost"];
        full.extend_from_slice(args);
        HostArgs::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--plugin", "/opt/plugins/kv"]);
        assert_eq!(args.port, 8300);
        assert_eq!(args.mount, "plugin");
        assert!(!args.verbose);
        assert!(!args.needs_prompt());

        let config = args.into_config(None).unwrap();
        assert_eq!(
            config.mode,
            LaunchMode::Launch {
                plugin: PathBuf::from("/opt/plugins/kv")
            }
        );
        assert!(config.plugin_config.is_empty());
        assert_eq!(config.socket_addr().port(), 8300);
    }

    #[test]
    fn test_relative_plugin_is_made_absolute() {
        let config = parse(&["--plugin", "bin/kv"]).into_config(None).unwrap();
        match config.mode {
            LaunchMode::Launch { plugin } => {
                assert!(plugin.is_absolute());
                assert!(plugin.ends_with("bin/kv"));
            }
            other => panic!("unexpected mode: {other:?}"),
        }
    }

    #[test]
    fn test_launch_requires_plugin() {
        let err = parse(&[]).into_config(None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPlugin));
    }

    #[test]
    fn test_attach_string_wins() {
        let config = parse(&["--attach-string", " 1|4|unix|/tmp/p.sock|grpc| "])
            .into_config(None)
            .unwrap();
        assert_eq!(
            config.mode,
            LaunchMode::Attach {
                descriptor: "1|4|unix|/tmp/p.sock|grpc|".into()
            }
        );
    }

    #[test]
    fn test_attach_prompt() {
        let args = parse(&["--attach"]);
        assert!(args.needs_prompt());
        let config = args
            .clone()
            .into_config(Some("1|4|tcp|127.0.0.1:5000|grpc|\n".into()))
            .unwrap();
        assert!(matches!(config.mode, LaunchMode::Attach { .. }));

        let err = args.into_config(Some("\n".into())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDescriptor));
    }

    #[test]
    fn test_plugin_config_and_timeouts() {
        let config = parse(&[
            "--plugin",
            "/bin/kv",
            "--config",
            "ttl=60,region=eu",
            "--request-timeout",
            "1m30s",
            "--mount",
            "secrets",
            "-v",
        ])
        .into_config(None)
        .unwrap();

        assert_eq!(config.plugin_config["ttl"], "60");
        assert_eq!(config.plugin_config["region"], "eu");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.mount_name(), "secrets");
        assert!(config.verbose);
    }

    #[test]
    fn test_bad_plugin_config_is_reported() {
        let err = parse(&["--plugin", "/bin/kv", "--config", "oops"])
            .into_config(None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::PluginConfigPair(_)));
    }
}
