//! Router admin sessions.
//!
//! A [`Session`] is an explicit value handed to every rule operation. The
//! [`SessionManager`] moves it through its states:
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated -> Invalidated
//!        ^                 |                 |
//!        +-----------------+-----------------+  (failed login / expiry)
//! ```

use chrono::{DateTime, Utc};
use sagemcom_core::credentials::CredentialSource;
use sagemcom_core::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::{LoginResponse, RouterId};
use crate::transport::{ResponseClass, RouterRequest, Transport};

/// Login endpoint.
pub const LOGIN_PATH: &str = "user/login";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token; a login is needed.
    Unauthenticated,
    /// A login handshake is in flight.
    Authenticating,
    /// The router issued a token.
    Authenticated,
    /// Explicitly logged out. Terminal.
    Invalidated,
}

/// One authenticated connection to the router's admin API.
pub struct Session {
    base_url: Url,
    token: Option<SecretString>,
    user_id: Option<RouterId>,
    created_at: Option<DateTime<Utc>>,
    state: SessionState,
}

impl Session {
    /// A fresh, unauthenticated session for the router at `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            token: None,
            user_id: None,
            created_at: None,
            state: SessionState::Unauthenticated,
        }
    }

    /// Router this session belongs to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true if the session may be used for rule operations.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.state, SessionState::Authenticated) && self.token.is_some()
    }

    /// When the router issued the current token.
    #[must_use]
    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Router user the token belongs to.
    #[must_use]
    pub const fn user_id(&self) -> Option<&RouterId> {
        self.user_id.as_ref()
    }

    /// Bearer token of a valid session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpired`] if the session is not valid.
    pub fn bearer(&self) -> Result<SecretString> {
        match (&self.token, self.state) {
            (Some(token), SessionState::Authenticated) => Ok(token.clone()),
            (_, state) => Err(Error::SessionExpired(format!(
                "session for {} is {state:?}",
                self.base_url
            ))),
        }
    }

    /// Drop the token after the router reported it unknown.
    ///
    /// An invalidated session stays invalidated.
    pub fn expire(&mut self) {
        if self.state != SessionState::Invalidated {
            self.clear(SessionState::Unauthenticated);
        }
    }

    fn clear(&mut self, state: SessionState) {
        self.token = None;
        self.user_id = None;
        self.created_at = None;
        self.state = state;
    }

    fn establish(&mut self, token: SecretString, user_id: Option<RouterId>) {
        self.token = Some(token);
        self.user_id = user_id;
        self.created_at = Some(Utc::now());
        self.state = SessionState::Authenticated;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("state", &self.state)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Performs login, revalidation and logout against one router.
#[derive(Clone)]
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("router", &self.transport.base_url().as_str())
            .field("credentials", &self.credentials.describe())
            .finish()
    }
}

impl SessionManager {
    /// Create a manager using `credentials` for every login.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Log in and return an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] for rejected or missing
    /// credentials, [`Error::ConcurrentSessionConflict`] when another admin
    /// session is active and [`Error::Unreachable`] on transport failure.
    pub async fn login(&self) -> Result<Session> {
        let mut session = Session::new(self.transport.base_url());
        self.authenticate(&mut session).await?;
        Ok(session)
    }

    /// Run the login handshake for `session`.
    ///
    /// On failure the session is left unauthenticated.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::login`]. A logged out session cannot be revived
    /// and yields [`Error::SessionExpired`].
    pub async fn authenticate(&self, session: &mut Session) -> Result<()> {
        if session.state == SessionState::Invalidated {
            return Err(Error::SessionExpired(format!(
                "session for {} was logged out",
                session.base_url
            )));
        }
        session.clear(SessionState::Authenticating);
        match self.handshake().await {
            Ok(login) => {
                info!(router = %session.base_url, "logged in to router");
                session.establish(
                    SecretString::from(login.created.token),
                    login.created.user_id,
                );
                Ok(())
            }
            Err(err) => {
                session.clear(SessionState::Unauthenticated);
                Err(err)
            }
        }
    }

    async fn handshake(&self) -> Result<LoginResponse> {
        let password = self.credentials.password().await?;
        let request = RouterRequest::post(LOGIN_PATH)
            .with_body(json!({ "password": password.expose_secret() }));

        let reply = self.transport.send(request).await?;
        match reply.class {
            ResponseClass::Success => {}
            ResponseClass::AuthenticationRequired => {
                warn!(status = reply.status, "router rejected the credentials");
                return Err(Error::AuthenticationFailed(format!(
                    "router rejected the credentials (HTTP {})",
                    reply.status
                )));
            }
            ResponseClass::ConcurrencyRejected | ResponseClass::Conflict => {
                return Err(Error::ConcurrentSessionConflict(format!(
                    "router refused the login (HTTP {}): another admin session is active",
                    reply.status
                )));
            }
            _ => return Err(reply.into_error("login")),
        }

        let login: LoginResponse = serde_json::from_value(reply.payload).map_err(|e| {
            Error::MalformedResponse(format!("unexpected login response: {e}"))
        })?;
        if login.created.token.is_empty() {
            return Err(Error::MalformedResponse(
                "login response carried an empty token".to_string(),
            ));
        }
        Ok(login)
    }

    /// Make sure `session` is usable, logging in again if it is not.
    ///
    /// # Errors
    ///
    /// Returns the login error if re-authentication fails.
    pub async fn ensure_valid(&self, session: &mut Session) -> Result<()> {
        if session.is_valid() {
            return Ok(());
        }
        debug!(state = ?session.state(), "session not valid, logging in again");
        self.authenticate(session).await
    }

    /// End the session on the router.
    ///
    /// Best effort: failures are logged and the session is invalidated
    /// regardless.
    pub async fn logout(&self, session: &mut Session) {
        if let (Some(token), Some(user_id)) = (&session.token, &session.user_id) {
            let request = RouterRequest::delete(format!(
                "user/{user_id}/token/{}",
                token.expose_secret()
            ))
            .with_redacted_path(format!("user/{user_id}/token/<redacted>"))
            .with_token(token.clone());

            match self.transport.send(request).await {
                Ok(reply) if reply.is_success() => {
                    info!(router = %session.base_url, "logged out of router");
                }
                Ok(reply) => warn!(status = reply.status, "router refused the logout"),
                Err(err) => warn!(error = %err, "logout failed"),
            }
        } else if session.is_valid() {
            debug!("router issued no user id, nothing to log out");
        }
        session.clear(SessionState::Invalidated);
    }
}
