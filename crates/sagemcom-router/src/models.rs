//! Wire models for the router's REST dialect.
//!
//! These mirror the JSON the router sends and expects under `/rest/v1/`. They
//! are converted to and from [`PortForwardRule`] at the repository boundary.

use sagemcom_core::{Error, PortForwardRule, Protocol, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Identifier the router assigns to users and rules; numeric on most firmware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouterId {
    /// Numeric identifier.
    Number(u64),
    /// Textual identifier.
    Text(String),
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Body of `POST user/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    /// Token issued for the new session.
    pub created: CreatedToken,
}

/// Token and user id issued at login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedToken {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// User the token belongs to; addresses the logout endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<RouterId>,
}

/// A rule as the router stores it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleBody {
    /// LAN host address.
    pub local_address: String,
    /// First LAN port.
    pub local_start_port: u16,
    /// Last LAN port; single-port rules repeat the start port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_end_port: Option<u16>,
    /// First external port.
    pub external_start_port: u16,
    /// Last external port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_end_port: Option<u16>,
    /// `tcp`, `udp` or `tcp_udp`.
    pub protocol: String,
    /// Whether the rule is applied.
    #[serde(default)]
    pub enable: bool,
    /// Present on delete requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Label, only present on firmware that stores one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RuleBody {
    /// Router representation of a caller rule.
    #[must_use]
    pub fn from_rule(rule: &PortForwardRule) -> Self {
        Self {
            local_address: rule.internal_address.to_string(),
            local_start_port: rule.internal_port,
            local_end_port: Some(rule.internal_port),
            external_start_port: rule.external_port,
            external_end_port: Some(rule.external_port),
            protocol: rule.protocol.wire_name().to_string(),
            enable: rule.enabled,
            read_only: None,
            name: None,
        }
    }

    fn protocol(&self) -> Result<Protocol> {
        self.protocol.parse().map_err(|_| {
            Error::MalformedResponse(format!("unknown protocol `{}` in rule", self.protocol))
        })
    }

    fn internal_address(&self) -> Result<Ipv4Addr> {
        self.local_address.parse().map_err(|_| {
            Error::MalformedResponse(format!(
                "rule local address `{}` is not an IPv4 address",
                self.local_address
            ))
        })
    }
}

/// One row of the router's port-forwarding table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleEntry {
    /// Router-assigned rule id.
    pub id: RouterId,
    /// Rule definition.
    pub rule: RuleBody,
}

impl RuleEntry {
    /// External port the entry forwards.
    #[must_use]
    pub const fn external_port(&self) -> u16 {
        self.rule.external_start_port
    }

    /// Caller-facing view of the entry.
    ///
    /// Entries without a stored label are named after their router id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if the address or protocol is not
    /// understood.
    pub fn to_rule(&self) -> Result<PortForwardRule> {
        let name = self
            .rule
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Rule {}", self.id));

        Ok(
            PortForwardRule::new(
                name,
                self.rule.external_start_port,
                self.rule.internal_address()?,
                self.rule.local_start_port,
            )
            .with_protocol(self.rule.protocol()?)
            .with_enabled(self.rule.enable),
        )
    }

    /// The entry in the shape the delete endpoint expects.
    #[must_use]
    pub fn for_deletion(&self) -> Self {
        let mut rule = self.rule.clone();
        rule.local_end_port = Some(rule.local_end_port.unwrap_or(rule.local_start_port));
        rule.external_end_port = Some(rule.external_end_port.unwrap_or(rule.external_start_port));
        rule.read_only = Some(false);
        rule.name = None;
        Self {
            id: self.id.clone(),
            rule,
        }
    }
}

/// The `portforwarding` member of a list response; some firmware returns the
/// bare list, or `{}` when no rules exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortForwardingTable {
    /// `{"rules": [...]}`
    Wrapped {
        /// Table rows.
        rules: Vec<RuleEntry>,
    },
    /// `{}`
    Empty(EmptyTable),
    /// `[...]`
    Bare(Vec<RuleEntry>),
}

/// An object with no members at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EmptyTable {}

impl PortForwardingTable {
    /// Rows in router order.
    #[must_use]
    pub fn into_entries(self) -> Vec<RuleEntry> {
        match self {
            Self::Wrapped { rules } | Self::Bare(rules) => rules,
            Self::Empty(_) => Vec::new(),
        }
    }
}

/// Body of `GET network/portforwarding`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListResponse {
    /// The table.
    pub portforwarding: PortForwardingTable,
}

/// Body of `POST network/portforwarding`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRuleRequest {
    /// Rule to add.
    pub rule: RuleBody,
}

/// Body of `DELETE network/portforwarding`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteRulesRequest {
    /// Rows to remove.
    pub portforwarding: DeleteTable,
}

/// Rows listed in a delete request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteTable {
    /// Rows to remove.
    pub rules: Vec<RuleEntry>,
}

impl DeleteRulesRequest {
    /// Request removing a single entry.
    #[must_use]
    pub fn single(entry: &RuleEntry) -> Self {
        Self {
            portforwarding: DeleteTable {
                rules: vec![entry.for_deletion()],
            },
        }
    }
}

/// Echo some firmware returns after a create, either wrapped in `created` or
/// bare.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum CreateEcho {
    Wrapped { created: EchoedRule },
    Bare(EchoedRule),
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EchoedRule {
    #[serde(default)]
    pub(crate) id: Option<RouterId>,
    pub(crate) rule: RuleBody,
}

impl CreateEcho {
    pub(crate) fn into_rule(self) -> EchoedRule {
        match self {
            Self::Wrapped { created } | Self::Bare(created) => created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_response_wrapped_and_bare() {
        let wrapped: ListResponse = serde_json::from_value(json!({
            "portforwarding": {"rules": [
                {"id": 1, "rule": {"localAddress": "192.168.178.10", "localStartPort": 80, "externalStartPort": 8080, "protocol": "tcp", "enable": true}}
            ]}
        }))
        .unwrap();
        assert_eq!(wrapped.portforwarding.into_entries().len(), 1);

        let bare: ListResponse = serde_json::from_value(json!({
            "portforwarding": [
                {"id": "a", "rule": {"localAddress": "192.168.178.11", "localStartPort": 22, "externalStartPort": 2222, "protocol": "tcp_udp"}}
            ]
        }))
        .unwrap();
        let entries = bare.portforwarding.into_entries();
        assert_eq!(entries[0].id, RouterId::Text("a".into()));
        assert!(!entries[0].rule.enable);

        let empty: ListResponse =
            serde_json::from_value(json!({"portforwarding": {}})).unwrap();
        assert!(empty.portforwarding.into_entries().is_empty());
    }

    #[test]
    fn table_without_rules_member_is_rejected() {
        let unknown = serde_json::from_value::<ListResponse>(json!({
            "portforwarding": {"entries": [
                {"id": 1, "rule": {"localAddress": "192.168.178.10", "localStartPort": 80, "externalStartPort": 8080, "protocol": "tcp"}}
            ]}
        }));
        assert!(unknown.is_err());
    }

    #[test]
    fn entry_to_rule_names_after_id() {
        let entry: RuleEntry = serde_json::from_value(json!({
            "id": 2,
            "rule": {"localAddress": "192.168.178.11", "localStartPort": 22, "externalStartPort": 2222, "protocol": "tcp_udp", "enable": false}
        }))
        .unwrap();

        let rule = entry.to_rule().unwrap();
        assert_eq!(rule.name, "Rule 2");
        assert_eq!(rule.external_port, 2222);
        assert_eq!(rule.internal_address, Ipv4Addr::new(192, 168, 178, 11));
        assert_eq!(rule.internal_port, 22);
        assert_eq!(rule.protocol, Protocol::TcpAndUdp);
        assert!(!rule.enabled);
    }

    #[test]
    fn entry_with_garbage_is_malformed() {
        let entry: RuleEntry = serde_json::from_value(json!({
            "id": 3,
            "rule": {"localAddress": "not-an-ip", "localStartPort": 1, "externalStartPort": 1, "protocol": "tcp"}
        }))
        .unwrap();
        assert!(matches!(entry.to_rule(), Err(Error::MalformedResponse(_))));

        let entry: RuleEntry = serde_json::from_value(json!({
            "id": 4,
            "rule": {"localAddress": "192.168.178.2", "localStartPort": 1, "externalStartPort": 1, "protocol": "gre"}
        }))
        .unwrap();
        assert!(matches!(entry.to_rule(), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn create_request_payload() {
        let rule = PortForwardRule::new("test", 4000, Ipv4Addr::new(192, 168, 178, 20), 3000)
            .with_protocol(Protocol::Udp);
        let payload = serde_json::to_value(CreateRuleRequest {
            rule: RuleBody::from_rule(&rule),
        })
        .unwrap();

        assert_eq!(
            payload,
            json!({"rule": {
                "localAddress": "192.168.178.20",
                "localStartPort": 3000,
                "localEndPort": 3000,
                "externalStartPort": 4000,
                "externalEndPort": 4000,
                "protocol": "udp",
                "enable": true
            }})
        );
    }

    #[test]
    fn delete_request_payload() {
        let entry: RuleEntry = serde_json::from_value(json!({
            "id": 1,
            "rule": {"localAddress": "192.168.178.10", "localStartPort": 80, "externalStartPort": 8080, "protocol": "tcp", "enable": true}
        }))
        .unwrap();

        let payload = serde_json::to_value(DeleteRulesRequest::single(&entry)).unwrap();
        assert_eq!(
            payload,
            json!({"portforwarding": {"rules": [
                {"id": 1, "rule": {
                    "enable": true,
                    "externalStartPort": 8080,
                    "externalEndPort": 8080,
                    "protocol": "tcp",
                    "localStartPort": 80,
                    "localEndPort": 80,
                    "localAddress": "192.168.178.10",
                    "readOnly": false
                }}
            ]}})
        );
    }

    #[test]
    fn login_response_accepts_numeric_and_text_user_ids() {
        let login: LoginResponse = serde_json::from_value(json!({
            "created": {"token": "abc", "userId": 3}
        }))
        .unwrap();
        assert_eq!(login.created.user_id, Some(RouterId::Number(3)));

        let login: LoginResponse = serde_json::from_value(json!({
            "created": {"token": "abc", "userId": "admin"}
        }))
        .unwrap();
        assert_eq!(login.created.user_id.unwrap().to_string(), "admin");
    }

    #[test]
    fn create_echo_shapes() {
        let echo: CreateEcho = serde_json::from_value(json!({
            "created": {"id": 9, "rule": {"localAddress": "192.168.178.2", "localStartPort": 1, "externalStartPort": 1, "protocol": "tcp"}}
        }))
        .unwrap();
        assert_eq!(echo.into_rule().id, Some(RouterId::Number(9)));

        let echo: CreateEcho = serde_json::from_value(json!({
            "rule": {"localAddress": "192.168.178.2", "localStartPort": 1, "externalStartPort": 1, "protocol": "tcp"}
        }))
        .unwrap();
        assert!(echo.into_rule().id.is_none());
    }
}
