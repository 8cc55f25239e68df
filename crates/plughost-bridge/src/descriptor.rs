//! The descriptor a plugin prints to announce its listening endpoint.

use crate::error::DescriptorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport network named in a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Unix,
    Tcp,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Unix => "unix",
            Network::Tcp => "tcp",
        }
    }
}

/// Wire protocol named in a descriptor.
///
/// Anything other than `grpc` is the legacy net/rpc flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    Grpc,
    NetRpc,
}

impl WireProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireProtocol::Grpc => "grpc",
            WireProtocol::NetRpc => "netrpc",
        }
    }
}

/// Parsed `core-version|protocol-version|network|address|wire|` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Version of the descriptor format itself.
    pub core_version: u32,
    /// Application protocol version the plugin speaks.
    pub protocol_version: u32,
    pub network: Network,
    /// Socket path or `host:port`.
    pub address: String,
    pub wire: WireProtocol,
}

impl Descriptor {
    /// Parse a descriptor.
    ///
    /// Surrounding whitespace and a single trailing `|` are ignored; exactly
    /// five fields must remain.
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let text = text.trim();
        let text = text.strip_suffix('|').unwrap_or(text);
        let fields: Vec<&str> = text.split('|').collect();
        if fields.len() != 5 {
            return Err(DescriptorError::FieldCount(fields.len()));
        }

        let core_version = parse_version("core version", fields[0])?;
        let protocol_version = parse_version("protocol version", fields[1])?;

        let network = match fields[2] {
            "unix" => Network::Unix,
            "tcp" => Network::Tcp,
            other => {
                return Err(DescriptorError::InvalidField {
                    field: "network",
                    value: other.to_string(),
                })
            }
        };

        let address = fields[3].trim();
        if address.is_empty() {
            return Err(DescriptorError::InvalidField {
                field: "address",
                value: String::new(),
            });
        }

        let wire = if fields[4] == "grpc" {
            WireProtocol::Grpc
        } else {
            WireProtocol::NetRpc
        };

        Ok(Self {
            core_version,
            protocol_version,
            network,
            address: address.to_string(),
            wire,
        })
    }

    /// Whether a line of plugin output carries a descriptor.
    pub fn looks_like(line: &str) -> bool {
        line.contains("|unix|") || line.contains("|tcp|")
    }
}

fn parse_version(field: &'static str, value: &str) -> Result<u32, DescriptorError> {
    value
        .trim()
        .parse()
        .map_err(|_| DescriptorError::InvalidField {
            field,
            value: value.to_string(),
        })
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|",
            self.core_version,
            self.protocol_version,
            self.network.as_str(),
            self.address,
            self.wire.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_unix() {
        let d = Descriptor::parse("1|4|unix|/tmp/plugin123.sock|grpc|").unwrap();
        assert_eq!(d.core_version, 1);
        assert_eq!(d.protocol_version, 4);
        assert_eq!(d.network, Network::Unix);
        assert_eq!(d.address, "/tmp/plugin123.sock");
        assert_eq!(d.wire, WireProtocol::Grpc);
    }

    #[test]
    fn test_parse_tcp_without_trailing_delimiter() {
        let d = Descriptor::parse("  1|5|tcp|127.0.0.1:10000|grpc\n").unwrap();
        assert_eq!(d.network, Network::Tcp);
        assert_eq!(d.address, "127.0.0.1:10000");
        assert_eq!(d.protocol_version, 5);
    }

    #[test]
    fn test_non_grpc_is_netrpc() {
        let d = Descriptor::parse("1|4|unix|/tmp/p.sock|netrpc|").unwrap();
        assert_eq!(d.wire, WireProtocol::NetRpc);
    }

    #[test]
    fn test_field_count() {
        assert_eq!(
            Descriptor::parse("1|4|unix|/tmp/p.sock|").unwrap_err(),
            DescriptorError::FieldCount(4)
        );
        assert_eq!(
            Descriptor::parse("1|4|unix|/tmp/p.sock|grpc|extra|").unwrap_err(),
            DescriptorError::FieldCount(6)
        );
        assert!(Descriptor::parse("").is_err());
    }

    #[test]
    fn test_invalid_fields() {
        let err = Descriptor::parse("x|4|unix|/tmp/p.sock|grpc|").unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidField { field: "core version", .. }));

        let err = Descriptor::parse("1|4|udp|/tmp/p.sock|grpc|").unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidField { field: "network", .. }));

        let err = Descriptor::parse("1|4|unix| |grpc|").unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidField { field: "address", .. }));
    }

    #[test]
    fn test_looks_like() {
        assert!(Descriptor::looks_like("1|4|unix|/tmp/x|grpc|"));
        assert!(Descriptor::looks_like("1|4|tcp|127.0.0.1:1|grpc|"));
        assert!(!Descriptor::looks_like("plugin starting up"));
        assert!(!Descriptor::looks_like("unix socket ready"));
    }

    proptest! {
        #[test]
        fn test_display_parses_back(
            core in 0u32..10,
            proto in 0u32..10,
            tcp in any::<bool>(),
            address in "[a-zA-Z0-9/._:-]{1,40}",
            grpc in any::<bool>(),
        ) {
            let d = Descriptor {
                core_version: core,
                protocol_version: proto,
                network: if tcp { Network::Tcp } else { Network::Unix },
                address,
                wire: if grpc { WireProtocol::Grpc } else { WireProtocol::NetRpc },
            };
            let text = d.to_string();
            prop_assert!(Descriptor::looks_like(&text));
            prop_assert_eq!(Descriptor::parse(&text).unwrap(), d);
        }
    }
}
