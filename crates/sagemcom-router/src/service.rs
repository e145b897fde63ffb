//! The port-forward service, the entry point command surfaces bind to.
//!
//! Each operation resolves its inputs locally, makes sure a session is held,
//! and delegates to the [`RuleRepository`]. When the router stops recognising
//! the session mid-operation the whole operation is retried once after a fresh
//! login; a second rejection is reported as an authentication failure.
//!
//! Every error an operation returns is wrapped in [`Error::Operation`] naming
//! the operation and the inputs it was called with.

use sagemcom_core::config::RouterConfig;
use sagemcom_core::credentials::CredentialSource;
use sagemcom_core::{Error, OperationContext, PortForwardRule, Protocol, Result, SubnetPrefix};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::launcher::{AdminLauncher, SystemBrowser};
use crate::rules::RuleRepository;
use crate::session::{Session, SessionManager};
use crate::transport::{HttpTransport, Transport};

/// Manage port forwards on one router.
pub struct PortForwardService {
    subnet: SubnetPrefix,
    base_url: Url,
    sessions: SessionManager,
    rules: RuleRepository,
    launcher: Box<dyn AdminLauncher>,
    session: Option<Session>,
}

impl std::fmt::Debug for PortForwardService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortForwardService")
            .field("router", &self.base_url.as_str())
            .field("subnet", &self.subnet)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl PortForwardService {
    /// Service for the configured router, talking HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for invalid configuration.
    pub fn from_config(
        config: &RouterConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self> {
        config.check()?;
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(Arc::new(transport), credentials, config.subnet_prefix()?))
    }

    /// Service over an arbitrary transport.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
        subnet: SubnetPrefix,
    ) -> Self {
        Self {
            subnet,
            base_url: transport.base_url(),
            sessions: SessionManager::new(transport.clone(), credentials),
            rules: RuleRepository::new(transport),
            launcher: Box::new(SystemBrowser),
            session: None,
        }
    }

    /// Replace the browser launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: impl AdminLauncher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Subnet prefix shorthand addresses expand against.
    #[must_use]
    pub const fn subnet(&self) -> SubnetPrefix {
        self.subnet
    }

    /// Session currently held, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Forward `external_port` to `local_address:local_port`.
    ///
    /// `local_address` is a full IPv4 address or a final octet on the router's
    /// subnet. The protocol defaults to TCP and UDP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::InvalidRule`] before any
    /// network call, [`Error::RuleConflict`] if the port or name is taken, and
    /// any session error from logging in.
    pub async fn open(
        &mut self,
        name: &str,
        local_address: &str,
        local_port: u16,
        external_port: u16,
        protocol: Option<Protocol>,
    ) -> Result<PortForwardRule> {
        let context = OperationContext::new("open")
            .with_name(name)
            .with_local_address(local_address)
            .with_local_port(local_port)
            .with_external_port(external_port);
        self.create(name, local_address, local_port, external_port, protocol)
            .await
            .map_err(|err| err.in_operation(context))
    }

    async fn create(
        &mut self,
        name: &str,
        local_address: &str,
        local_port: u16,
        external_port: u16,
        protocol: Option<Protocol>,
    ) -> Result<PortForwardRule> {
        let address = self.subnet.resolve(local_address)?;
        let rule = PortForwardRule::new(name.trim(), external_port, address, local_port)
            .with_protocol(protocol.unwrap_or_default());
        rule.check()?;

        let mut reauthenticated = false;
        loop {
            let session = self.acquire().await?;
            let outcome = self.rules.create(&session, &rule).await;
            if let Some(created) = self.settle(session, outcome, &mut reauthenticated)? {
                return Ok(created);
            }
        }
    }

    /// Remove the forward on `external_port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleNotFound`] if no rule uses the port.
    pub async fn close(&mut self, external_port: u16) -> Result<()> {
        self.delete(external_port).await.map_err(|err| {
            err.in_operation(OperationContext::new("close").with_external_port(external_port))
        })
    }

    async fn delete(&mut self, external_port: u16) -> Result<()> {
        if external_port == 0 {
            return Err(Error::InvalidRule(
                "external port must be in 1-65535".to_string(),
            ));
        }

        let mut reauthenticated = false;
        loop {
            let session = self.acquire().await?;
            let outcome = self.rules.delete(&session, external_port).await;
            if let Some(()) = self.settle(session, outcome, &mut reauthenticated)? {
                return Ok(());
            }
        }
    }

    /// Current forwards in router order.
    ///
    /// # Errors
    ///
    /// Returns session and transport errors; an empty table is not an error.
    pub async fn list(&mut self) -> Result<Vec<PortForwardRule>> {
        self.fetch()
            .await
            .map_err(|err| err.in_operation(OperationContext::new("list")))
    }

    async fn fetch(&mut self) -> Result<Vec<PortForwardRule>> {
        let mut reauthenticated = false;
        loop {
            let session = self.acquire().await?;
            let outcome = self.rules.list(&session).await;
            if let Some(rules) = self.settle(session, outcome, &mut reauthenticated)? {
                return Ok(rules);
            }
        }
    }

    /// Open the router's admin page in the default browser.
    ///
    /// A held session is logged out first so the router does not reject the
    /// browser's login as a concurrent session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailed`] if no browser could be started.
    pub async fn open_admin_interface(&mut self) -> Result<Url> {
        self.logout().await;
        self.launcher
            .open(&self.base_url)
            .map_err(|err| err.in_operation(OperationContext::new("open_admin_interface")))?;
        Ok(self.base_url.clone())
    }

    /// Log out the held session, if any. Failures are only logged.
    pub async fn logout(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.sessions.logout(&mut session).await;
        }
    }

    async fn acquire(&mut self) -> Result<Session> {
        match self.session.take() {
            Some(mut session) => {
                self.sessions.ensure_valid(&mut session).await?;
                Ok(session)
            }
            None => self.sessions.login().await,
        }
    }

    /// Keep the session and decide whether the operation is finished.
    ///
    /// `Ok(None)` asks the caller to run the operation again.
    fn settle<T>(
        &mut self,
        mut session: Session,
        outcome: Result<T>,
        reauthenticated: &mut bool,
    ) -> Result<Option<T>> {
        match outcome {
            Err(err) if err.is_session_expired() => {
                session.expire();
                self.session = Some(session);
                if *reauthenticated {
                    warn!(error = %err, "router rejected a fresh session");
                    return Err(Error::AuthenticationFailed(format!(
                        "router rejected the session again after logging in: {err}"
                    )));
                }
                debug!("router dropped the session, retrying after a fresh login");
                *reauthenticated = true;
                Ok(None)
            }
            other => {
                self.session = Some(session);
                other.map(Some)
            }
        }
    }
}
