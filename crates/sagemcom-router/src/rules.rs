//! Port-forward rules stored on the router.
//!
//! Rules are never cached: every operation starts from a fresh read of the
//! router's table. Uniqueness checks run against that read before any change
//! is sent, and the router's own conflict response stays authoritative.

use sagemcom_core::{Error, PortForwardRule, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{
    CreateEcho, CreateRuleRequest, DeleteRulesRequest, ListResponse, RouterId, RuleBody,
    RuleEntry,
};
use crate::session::Session;
use crate::transport::{ResponseClass, RouterRequest, Transport};

/// Port-forwarding endpoint.
pub const PORT_FORWARDING_PATH: &str = "network/portforwarding";

/// Lists, creates and deletes rules on behalf of a [`Session`].
#[derive(Clone)]
pub struct RuleRepository {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for RuleRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRepository")
            .field("router", &self.transport.base_url().as_str())
            .finish()
    }
}

impl RuleRepository {
    /// Create a repository sending through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn entries(&self, session: &Session) -> Result<Vec<RuleEntry>> {
        let token = session.bearer()?;
        let reply = self
            .transport
            .send(RouterRequest::get(PORT_FORWARDING_PATH).with_token(token))
            .await?;
        let payload = reply.into_payload("list port forwards")?;

        let table: ListResponse = serde_json::from_value(payload).map_err(|e| {
            Error::MalformedResponse(format!("unexpected port-forwarding table: {e}"))
        })?;
        let entries = table.portforwarding.into_entries();
        debug!(count = entries.len(), "fetched port-forwarding table");
        Ok(entries)
    }

    /// Current rules in router order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpired`] for an invalid session or when the
    /// router no longer accepts it, and [`Error::MalformedResponse`] when the
    /// table cannot be understood.
    pub async fn list(&self, session: &Session) -> Result<Vec<PortForwardRule>> {
        self.entries(session)
            .await?
            .iter()
            .map(RuleEntry::to_rule)
            .collect()
    }

    /// Add a rule and return it as the router confirmed it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] before any request for a malformed rule,
    /// and [`Error::RuleConflict`] when the external port or the name is
    /// already used, either by the fresh table read or by the router itself.
    pub async fn create(
        &self,
        session: &Session,
        rule: &PortForwardRule,
    ) -> Result<PortForwardRule> {
        rule.check()?;

        for entry in self.entries(session).await? {
            if entry.external_port() == rule.external_port {
                return Err(Error::RuleConflict {
                    external_port: rule.external_port,
                    message: format!(
                        "already forwarded to {}:{}",
                        entry.rule.local_address, entry.rule.local_start_port
                    ),
                });
            }
            if let Ok(existing) = entry.to_rule() {
                if existing.same_name(&rule.name) {
                    return Err(Error::RuleConflict {
                        external_port: rule.external_port,
                        message: format!(
                            "name `{}` is already used by the rule on external port {}",
                            rule.name, existing.external_port
                        ),
                    });
                }
            }
        }

        let body = CreateRuleRequest {
            rule: RuleBody::from_rule(rule),
        };
        let request = RouterRequest::post(PORT_FORWARDING_PATH)
            .with_token(session.bearer()?)
            .with_body(serde_json::to_value(body)?);
        let reply = self.transport.send(request).await?;

        match reply.class {
            ResponseClass::Success => {}
            ResponseClass::Conflict => {
                return Err(Error::RuleConflict {
                    external_port: rule.external_port,
                    message: "router rejected the rule as conflicting".to_string(),
                })
            }
            _ => return Err(reply.into_error("create port forward")),
        }

        info!(
            name = %rule.name,
            external_port = rule.external_port,
            internal = %format!("{}:{}", rule.internal_address, rule.internal_port),
            "created port forward"
        );
        Ok(confirmed(rule, reply.payload))
    }

    /// Remove the rule forwarding `external_port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleNotFound`] when no rule carries the port and
    /// [`Error::RuleConflict`] when several router entries do.
    pub async fn delete(&self, session: &Session, external_port: u16) -> Result<()> {
        if external_port == 0 {
            return Err(Error::InvalidRule(
                "external port must be in 1-65535".to_string(),
            ));
        }

        let mut matches: Vec<RuleEntry> = self
            .entries(session)
            .await?
            .into_iter()
            .filter(|entry| entry.external_port() == external_port)
            .collect();

        let entry = match matches.len() {
            0 => return Err(Error::RuleNotFound { external_port }),
            1 => matches.remove(0),
            n => {
                return Err(Error::RuleConflict {
                    external_port,
                    message: format!("{n} router entries use this port; remove them on the router"),
                })
            }
        };

        let request = RouterRequest::delete(PORT_FORWARDING_PATH)
            .with_token(session.bearer()?)
            .with_body(serde_json::to_value(DeleteRulesRequest::single(&entry))?);
        let reply = self.transport.send(request).await?;
        reply.into_payload("delete port forward")?;

        info!(external_port, id = %entry.id, "deleted port forward");
        Ok(())
    }
}

/// The created rule as the router echoed it, keeping the caller's name when
/// the router stores none.
fn confirmed(requested: &PortForwardRule, payload: serde_json::Value) -> PortForwardRule {
    if payload.is_null() {
        return requested.clone();
    }

    let echoed = match serde_json::from_value::<CreateEcho>(payload) {
        Ok(echo) => echo.into_rule(),
        Err(_) => return requested.clone(),
    };
    let entry = RuleEntry {
        id: echoed.id.unwrap_or(RouterId::Text(String::new())),
        rule: echoed.rule,
    };
    let name = entry.rule.name.clone();

    match entry.to_rule() {
        Ok(mut rule) => {
            rule.name = name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| requested.name.clone());
            rule
        }
        Err(_) => requested.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, Reply};
    use reqwest::{Method, StatusCode};
    use sagemcom_core::credentials::ExplicitPassword;
    use sagemcom_core::Protocol;
    use serde_json::{json, Value};
    use std::net::Ipv4Addr;
    use url::Url;

    use crate::session::SessionManager;

    fn base() -> Url {
        Url::parse("http://192.168.178.1/").unwrap()
    }

    fn table() -> Value {
        json!({"portforwarding": {"rules": [
            {"id": 1, "rule": {"localAddress": "192.168.178.10", "localStartPort": 80, "localEndPort": 80,
                "externalStartPort": 8080, "externalEndPort": 8080, "protocol": "tcp", "enable": true}},
            {"id": 2, "rule": {"localAddress": "192.168.178.11", "localStartPort": 22, "localEndPort": 22,
                "externalStartPort": 2222, "externalEndPort": 2222, "protocol": "tcp_udp", "enable": true}}
        ]}})
    }

    /// A transport that answers the login, then whatever `configure` sets up.
    async fn setup(configure: impl FnOnce(&mut MockTransport)) -> (RuleRepository, Session) {
        let mut transport = MockTransport::new();
        transport.expect_base_url().returning(base);
        transport
            .expect_send()
            .withf(|req| req.path == "user/login")
            .times(1)
            .returning(|_| {
                Ok(Reply::new(
                    StatusCode::OK,
                    json!({"created": {"token": "tok", "userId": 1}}),
                ))
            });
        configure(&mut transport);

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let manager = SessionManager::new(transport.clone(), Arc::new(ExplicitPassword::new("pw")));
        let session = manager.login().await.unwrap();
        (RuleRepository::new(transport), session)
    }

    fn expect_list(transport: &mut MockTransport, times: usize) {
        transport
            .expect_send()
            .withf(|req| req.method == Method::GET && req.path == PORT_FORWARDING_PATH)
            .times(times)
            .returning(|_| Ok(Reply::new(StatusCode::OK, table())));
    }

    #[tokio::test]
    async fn list_preserves_router_order() {
        let (repo, session) = setup(|t| expect_list(t, 1)).await;

        let rules = repo.list(&session).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].external_port, 8080);
        assert_eq!(rules[0].name, "Rule 1");
        assert_eq!(rules[0].protocol, Protocol::Tcp);
        assert_eq!(rules[1].external_port, 2222);
        assert_eq!(rules[1].internal_address, Ipv4Addr::new(192, 168, 178, 11));
    }

    #[tokio::test]
    async fn empty_table_is_empty_list() {
        let (repo, session) = setup(|t| {
            t.expect_send()
                .withf(|req| req.path == PORT_FORWARDING_PATH)
                .returning(|_| {
                    Ok(Reply::new(
                        StatusCode::OK,
                        json!({"portforwarding": {"rules": []}}),
                    ))
                });
        })
        .await;

        assert!(repo.list(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_without_valid_session_sends_nothing() {
        let mut transport = MockTransport::new();
        transport.expect_base_url().returning(base);
        transport.expect_send().never();
        let repo = RuleRepository::new(Arc::new(transport));

        let err = repo.list(&Session::new(base())).await.unwrap_err();
        assert!(err.is_session_expired());
    }

    #[tokio::test]
    async fn unauthenticated_reply_is_session_expired() {
        let (repo, session) = setup(|t| {
            t.expect_send()
                .withf(|req| req.path == PORT_FORWARDING_PATH)
                .returning(|_| Ok(Reply::new(StatusCode::UNAUTHORIZED, Value::Null)));
        })
        .await;

        assert!(repo.list(&session).await.unwrap_err().is_session_expired());
    }

    #[tokio::test]
    async fn unexpected_table_shape_is_malformed() {
        let (repo, session) = setup(|t| {
            t.expect_send()
                .withf(|req| req.path == PORT_FORWARDING_PATH)
                .returning(|_| Ok(Reply::new(StatusCode::OK, json!({"rules": []}))));
        })
        .await;

        assert!(matches!(
            repo.list(&session).await,
            Err(Error::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn table_with_unknown_member_is_malformed() {
        let (repo, session) = setup(|t| {
            t.expect_send()
                .withf(|req| req.path == PORT_FORWARDING_PATH)
                .returning(|_| {
                    Ok(Reply::new(
                        StatusCode::OK,
                        json!({"portforwarding": {"entries": [{"id": 1}]}}),
                    ))
                });
        })
        .await;

        assert!(matches!(
            repo.list(&session).await,
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            repo.delete(&session, 8080).await,
            Err(Error::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn create_posts_rule_and_returns_it() {
        let (repo, session) = setup(|t| {
            expect_list(t, 1);
            t.expect_send()
                .withf(|req| {
                    req.method == Method::POST
                        && req.path == PORT_FORWARDING_PATH
                        && req.body
                            == Some(json!({"rule": {
                                "localAddress": "192.168.178.100",
                                "localStartPort": 80,
                                "localEndPort": 80,
                                "externalStartPort": 8443,
                                "externalEndPort": 8443,
                                "protocol": "tcp_udp",
                                "enable": true
                            }}))
                })
                .times(1)
                .returning(|_| Ok(Reply::new(StatusCode::CREATED, Value::Null)));
        })
        .await;

        let rule = PortForwardRule::new("Web", 8443, Ipv4Addr::new(192, 168, 178, 100), 80);
        let created = repo.create(&session, &rule).await.unwrap();
        assert_eq!(created, rule);
    }

    #[tokio::test]
    async fn create_uses_router_echo() {
        let (repo, session) = setup(|t| {
            expect_list(t, 1);
            t.expect_send()
                .withf(|req| req.method == Method::POST)
                .returning(|_| {
                    Ok(Reply::new(
                        StatusCode::OK,
                        json!({"created": {"id": 9, "rule": {
                            "localAddress": "192.168.178.100", "localStartPort": 80,
                            "externalStartPort": 8443, "protocol": "tcp", "enable": true
                        }}}),
                    ))
                });
        })
        .await;

        let rule = PortForwardRule::new("Web", 8443, Ipv4Addr::new(192, 168, 178, 100), 80);
        let created = repo.create(&session, &rule).await.unwrap();
        assert_eq!(created.name, "Web");
        assert_eq!(created.protocol, Protocol::Tcp);
    }

    #[tokio::test]
    async fn create_with_taken_port_is_conflict_without_post() {
        let (repo, session) = setup(|t| expect_list(t, 1)).await;

        let rule = PortForwardRule::new("Other", 8080, Ipv4Addr::new(192, 168, 178, 50), 80);
        let err = repo.create(&session, &rule).await.unwrap_err();
        assert!(matches!(err, Error::RuleConflict { external_port: 8080, .. }));
    }

    #[tokio::test]
    async fn create_with_taken_name_is_conflict() {
        let (repo, session) = setup(|t| expect_list(t, 1)).await;

        let rule = PortForwardRule::new("rule 2", 9000, Ipv4Addr::new(192, 168, 178, 50), 80);
        let err = repo.create(&session, &rule).await.unwrap_err();
        assert!(matches!(
            err,
            Error::RuleConflict { external_port: 9000, ref message } if message.contains("rule 2")
        ));
    }

    #[tokio::test]
    async fn router_conflict_on_create_is_rule_conflict() {
        let (repo, session) = setup(|t| {
            expect_list(t, 1);
            t.expect_send()
                .withf(|req| req.method == Method::POST)
                .returning(|_| Ok(Reply::new(StatusCode::CONFLICT, Value::Null)));
        })
        .await;

        let rule = PortForwardRule::new("Web", 8443, Ipv4Addr::new(192, 168, 178, 100), 80);
        let err = repo.create(&session, &rule).await.unwrap_err();
        assert!(matches!(err, Error::RuleConflict { external_port: 8443, .. }));
    }

    #[tokio::test]
    async fn invalid_rule_fails_before_network() {
        let (repo, session) = setup(|_| {}).await;

        let rule = PortForwardRule::new(" ", 8443, Ipv4Addr::new(192, 168, 178, 100), 0);
        let err = repo.create(&session, &rule).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRule(_)));
    }

    #[tokio::test]
    async fn delete_sends_matching_entry() {
        let (repo, session) = setup(|t| {
            expect_list(t, 1);
            t.expect_send()
                .withf(|req| {
                    req.method == Method::DELETE
                        && req.path == PORT_FORWARDING_PATH
                        && req.body
                            == Some(json!({"portforwarding": {"rules": [
                                {"id": 2, "rule": {"localAddress": "192.168.178.11", "localStartPort": 22,
                                    "localEndPort": 22, "externalStartPort": 2222, "externalEndPort": 2222,
                                    "protocol": "tcp_udp", "enable": true, "readOnly": false}}
                            ]}}))
                })
                .times(1)
                .returning(|_| Ok(Reply::new(StatusCode::OK, Value::Null)));
        })
        .await;

        repo.delete(&session, 2222).await.unwrap();
    }

    #[tokio::test]
    async fn delete_unknown_port_is_not_found() {
        let (repo, session) = setup(|t| expect_list(t, 1)).await;

        let err = repo.delete(&session, 4444).await.unwrap_err();
        assert_eq!(err, Error::RuleNotFound { external_port: 4444 });
    }

    #[tokio::test]
    async fn delete_refuses_ambiguous_port() {
        let (repo, session) = setup(|t| {
            t.expect_send()
                .withf(|req| req.method == Method::GET)
                .returning(|_| {
                    Ok(Reply::new(
                        StatusCode::OK,
                        json!({"portforwarding": {"rules": [
                            {"id": 1, "rule": {"localAddress": "192.168.178.10", "localStartPort": 80, "externalStartPort": 8080, "protocol": "tcp"}},
                            {"id": 5, "rule": {"localAddress": "192.168.178.12", "localStartPort": 81, "externalStartPort": 8080, "protocol": "udp"}}
                        ]}}),
                    ))
                });
        })
        .await;

        let err = repo.delete(&session, 8080).await.unwrap_err();
        assert!(matches!(err, Error::RuleConflict { external_port: 8080, .. }));
    }

    #[tokio::test]
    async fn delete_port_zero_is_invalid() {
        let (repo, session) = setup(|_| {}).await;
        assert!(matches!(
            repo.delete(&session, 0).await,
            Err(Error::InvalidRule(_))
        ));
    }
}
