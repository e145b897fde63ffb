//! Local address shorthand resolution.
//!
//! Operators usually type only the last octet of a LAN host (`100`) instead of
//! the full address (`192.168.178.100`). Resolution is pure: it depends only on
//! the input and the configured subnet prefix and never touches the network.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The first three octets of the router's LAN, e.g. `192.168.178`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubnetPrefix([u8; 3]);

impl SubnetPrefix {
    /// Creates a prefix from its three octets.
    #[must_use]
    pub const fn new(a: u8, b: u8, c: u8) -> Self {
        Self([a, b, c])
    }

    /// Derives the prefix from a LAN address (typically the router's own).
    #[must_use]
    pub const fn from_address(address: Ipv4Addr) -> Self {
        let [a, b, c, _] = address.octets();
        Self([a, b, c])
    }

    /// Returns the prefix octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 3] {
        self.0
    }

    /// Builds the full address of host `last` on this subnet.
    #[must_use]
    pub const fn host(&self, last: u8) -> Ipv4Addr {
        let [a, b, c] = self.0;
        Ipv4Addr::new(a, b, c, last)
    }

    /// Resolves shorthand or full address input against this prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] when the input is neither a dotted quad
    /// nor a bare octet in `0..=255`.
    pub fn resolve(&self, input: &str) -> Result<Ipv4Addr> {
        let trimmed = input.trim();

        if trimmed.contains('.') {
            return Ipv4Addr::from_str(trimmed).map_err(|_| {
                Error::invalid_address(input, "expected four dot-separated octets in 0-255")
            });
        }

        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_address(
                input,
                "expected a full IPv4 address or a final octet",
            ));
        }

        trimmed
            .parse::<u8>()
            .map(|last| self.host(last))
            .map_err(|_| Error::invalid_address(input, "final octet must be in 0-255"))
    }
}

impl FromStr for SubnetPrefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::ConfigError(format!("invalid subnet prefix `{s}`"));

        let mut octets = [0u8; 3];
        let mut parts = s.trim().trim_end_matches('.').split('.');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *octet = part.parse().map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(octets))
    }
}

impl TryFrom<String> for SubnetPrefix {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SubnetPrefix> for String {
    fn from(prefix: SubnetPrefix) -> Self {
        prefix.to_string()
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

/// Resolves `input` against a textual subnet prefix.
///
/// A dotted quad is validated and returned unchanged; a bare integer in
/// `0..=255` becomes `<subnet_prefix>.<input>`.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] for unusable input and
/// [`Error::ConfigError`] when `subnet_prefix` is not three octets.
pub fn resolve(input: &str, subnet_prefix: &str) -> Result<Ipv4Addr> {
    subnet_prefix.parse::<SubnetPrefix>()?.resolve(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "192.168.178";

    #[test]
    fn dotted_quad_is_identity() {
        for input in ["192.168.1.50", "10.0.0.1", "0.0.0.0", "255.255.255.255"] {
            assert_eq!(resolve(input, PREFIX).unwrap().to_string(), input);
        }
    }

    #[test]
    fn every_octet_expands_against_prefix() {
        for n in 0..=255u16 {
            let resolved = resolve(&n.to_string(), PREFIX).unwrap();
            assert_eq!(resolved.to_string(), format!("192.168.178.{n}"));
        }
    }

    #[test]
    fn out_of_range_octet_is_rejected() {
        for input in ["256", "1000", "99999999999999999999"] {
            let err = resolve(input, PREFIX).unwrap_err();
            assert!(matches!(err, Error::InvalidAddress { .. }), "{input}");
        }
    }

    #[test]
    fn non_numeric_input_is_rejected() {
        for input in ["invalid", "", "-1", "+5", "1e2", " "] {
            let err = resolve(input, PREFIX).unwrap_err();
            assert!(matches!(err, Error::InvalidAddress { .. }), "{input:?}");
        }
    }

    #[test]
    fn malformed_dotted_input_is_rejected() {
        for input in ["192.168.178", "192.168.178.256", "1.2.3.4.5", "a.b.c.d", "192..1.1"] {
            let err = resolve(input, PREFIX).unwrap_err();
            assert!(matches!(err, Error::InvalidAddress { .. }), "{input}");
        }
    }

    #[test]
    fn invalid_address_keeps_the_input() {
        let err = resolve("300", PREFIX).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidAddress {
                input: "300".to_string(),
                reason: "final octet must be in 0-255".to_string(),
            }
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(
            resolve(" 100 ", PREFIX).unwrap(),
            Ipv4Addr::new(192, 168, 178, 100)
        );
    }

    #[test]
    fn prefix_parsing() {
        assert_eq!(
            "192.168.178".parse::<SubnetPrefix>().unwrap(),
            SubnetPrefix::new(192, 168, 178)
        );
        assert_eq!(
            "10.0.0.".parse::<SubnetPrefix>().unwrap(),
            SubnetPrefix::new(10, 0, 0)
        );
        assert!("192.168".parse::<SubnetPrefix>().is_err());
        assert!("192.168.178.1".parse::<SubnetPrefix>().is_err());
        assert!("192.168.300".parse::<SubnetPrefix>().is_err());
        assert!(matches!(
            resolve("100", "nope"),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn prefix_from_router_address() {
        let prefix = SubnetPrefix::from_address(Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(prefix.to_string(), "192.168.0");
        assert_eq!(prefix.host(20), Ipv4Addr::new(192, 168, 0, 20));
    }

    #[test]
    fn prefix_serde_round_trip_as_string() {
        let prefix = SubnetPrefix::new(192, 168, 178);
        let json = serde_json::to_string(&prefix).unwrap();
        assert_eq!(json, "\"192.168.178\"");
        let back: SubnetPrefix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prefix);
    }
}
