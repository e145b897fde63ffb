//! Port-forward domain types.
//!
//! [`PortForwardRule`] is the caller-facing view of a router rule. The router's
//! own rule identifiers never appear here; the external port identifies a rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::error::{Error, Result};

/// Transport protocol a rule forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protocol {
    /// TCP only
    Tcp,
    /// UDP only
    Udp,
    /// Both TCP and UDP
    #[default]
    TcpAndUdp,
}

impl Protocol {
    /// Returns the protocol name as the caller sees it.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::TcpAndUdp => "TCP_AND_UDP",
        }
    }

    /// Returns the value the router's REST API uses.
    #[must_use]
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::TcpAndUdp => "tcp_udp",
        }
    }

    /// Returns all protocols.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Tcp, Self::Udp, Self::TcpAndUdp]
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "tcp_udp" | "tcp/udp" | "tcp_and_udp" | "both" => Ok(Self::TcpAndUdp),
            _ => Err(Error::InvalidRule(format!("unknown protocol `{s}`"))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A port-forward rule mapping an external port to a LAN host and port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PortForwardRule {
    /// Human label, unique among active rules (case-insensitive).
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    /// Router-facing port; identifies the rule for close operations.
    #[validate(range(min = 1))]
    pub external_port: u16,
    /// LAN host receiving the traffic.
    pub internal_address: Ipv4Addr,
    /// Port on the LAN host.
    #[validate(range(min = 1))]
    pub internal_port: u16,
    /// Forwarded protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// Whether the router applies the rule.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

fn validate_name(name: &str) -> std::result::Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("empty_name"));
    }
    Ok(())
}

impl PortForwardRule {
    /// Creates an enabled rule forwarding both TCP and UDP.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        external_port: u16,
        internal_address: Ipv4Addr,
        internal_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            external_port,
            internal_address,
            internal_port,
            protocol: Protocol::default(),
            enabled: default_enabled(),
        }
    }

    /// Set the forwarded protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if both rules carry the same name, ignoring case.
    #[must_use]
    pub fn same_name(&self, other: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(other.trim())
    }

    /// Checks the rule locally before it is sent anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] for an empty name or a zero port.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|errors| {
            let mut fields = errors
                .field_errors()
                .keys()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            fields.sort();
            Error::InvalidRule(format!(
                "rule for external port {} has invalid {}",
                self.external_port,
                fields.join(", ")
            ))
        })
    }
}

impl fmt::Display for PortForwardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): :{} -> {}:{}",
            self.name, self.protocol, self.external_port, self.internal_address, self.internal_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_rule() -> PortForwardRule {
        PortForwardRule::new("Web", 8080, Ipv4Addr::new(192, 168, 178, 100), 80)
    }

    #[test]
    fn new_rule_defaults() {
        let rule = web_rule();
        assert_eq!(rule.protocol, Protocol::TcpAndUdp);
        assert!(rule.enabled);
        assert!(rule.check().is_ok());
    }

    #[test]
    fn builder_setters() {
        let rule = web_rule().with_protocol(Protocol::Udp).with_enabled(false);
        assert_eq!(rule.protocol, Protocol::Udp);
        assert!(!rule.enabled);
    }

    #[test]
    fn empty_name_is_invalid() {
        let mut rule = web_rule();
        rule.name = "   ".to_string();
        let err = rule.check().unwrap_err();
        assert!(matches!(err, Error::InvalidRule(ref msg) if msg.contains("name")));
    }

    #[test]
    fn zero_ports_are_invalid() {
        let mut rule = web_rule();
        rule.external_port = 0;
        rule.internal_port = 0;
        let err = rule.check().unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidRule(ref msg)
                if msg.contains("external_port") && msg.contains("internal_port")
        ));
    }

    #[test]
    fn names_compare_case_insensitively() {
        let rule = web_rule();
        assert!(rule.same_name("web"));
        assert!(rule.same_name(" WEB "));
        assert!(!rule.same_name("Webserver"));
    }

    #[test]
    fn protocol_parsing_accepts_router_and_caller_spellings() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("UDP".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!("tcp_udp".parse::<Protocol>().unwrap(), Protocol::TcpAndUdp);
        assert_eq!("tcp/udp".parse::<Protocol>().unwrap(), Protocol::TcpAndUdp);
        assert_eq!(
            "TCP_AND_UDP".parse::<Protocol>().unwrap(),
            Protocol::TcpAndUdp
        );
        assert!(matches!(
            "icmp".parse::<Protocol>(),
            Err(Error::InvalidRule(_))
        ));
    }

    #[test]
    fn protocol_names() {
        for protocol in Protocol::all() {
            assert_eq!(protocol.wire_name().parse::<Protocol>().unwrap(), *protocol);
            assert_eq!(protocol.name().parse::<Protocol>().unwrap(), *protocol);
        }
    }

    #[test]
    fn rule_serializes_for_callers() {
        let json = serde_json::to_value(web_rule()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Web",
                "external_port": 8080,
                "internal_address": "192.168.178.100",
                "internal_port": 80,
                "protocol": "TCP_AND_UDP",
                "enabled": true
            })
        );
    }

    #[test]
    fn rule_display() {
        assert_eq!(
            web_rule().to_string(),
            "Web (TCP_AND_UDP): :8080 -> 192.168.178.100:80"
        );
    }
}
