//! HTTP transport for the router's REST API.
//!
//! The transport is the only place that looks at raw HTTP responses. Every
//! received response is decoded into a [`Reply`] carrying a
//! [`ResponseClass`]; higher layers reason over those classes only.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use sagemcom_core::client::{ClientConfig, RetryPolicy};
use sagemcom_core::config::RouterConfig;
use sagemcom_core::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = concat!("sagemcom-router/", env!("CARGO_PKG_VERSION"));

/// Prefix of every REST endpoint.
pub const REST_PREFIX: &str = "rest/v1/";

/// How a received response is to be understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx
    Success,
    /// The router has no (or no longer a) session for the token.
    AuthenticationRequired,
    /// Another admin session is active or the router is rate limiting.
    ConcurrencyRejected,
    /// The router refused a change that clashes with existing state.
    Conflict,
    /// The admin panel answered but is not serving requests.
    Unavailable,
    /// Anything the dialect does not define.
    Unexpected,
}

impl ResponseClass {
    /// Classify an HTTP status code.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            s if s.is_success() => Self::Success,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::AuthenticationRequired,
            StatusCode::TOO_MANY_REQUESTS => Self::ConcurrencyRejected,
            StatusCode::CONFLICT => Self::Conflict,
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Self::Unavailable,
            _ => Self::Unexpected,
        }
    }
}

/// A decoded router response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// Classification of the status.
    pub class: ResponseClass,
    /// JSON body; `Null` when empty, a string when the body was not JSON.
    pub payload: Value,
}

impl Reply {
    /// Build a reply from its parts.
    #[must_use]
    pub fn new(status: StatusCode, payload: Value) -> Self {
        Self {
            status: status.as_u16(),
            class: ResponseClass::from_status(status),
            payload,
        }
    }

    /// Returns true for a 2xx reply.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.class == ResponseClass::Success
    }

    /// The payload of a successful reply, or the error its class maps to.
    ///
    /// # Errors
    ///
    /// See [`Reply::into_error`].
    pub fn into_payload(self, context: &str) -> Result<Value> {
        if self.is_success() {
            Ok(self.payload)
        } else {
            Err(self.into_error(context))
        }
    }

    /// Default error for a non-success reply.
    ///
    /// Conflicts are context dependent; callers that give them a meaning
    /// handle them before falling back to this.
    #[must_use]
    pub fn into_error(self, context: &str) -> Error {
        let detail = summarize(&self.payload);
        match self.class {
            ResponseClass::AuthenticationRequired => Error::SessionExpired(format!(
                "router requires authentication for {context} (HTTP {})",
                self.status
            )),
            ResponseClass::ConcurrencyRejected => Error::ConcurrentSessionConflict(format!(
                "router rejected {context}: another admin session is active"
            )),
            ResponseClass::Unavailable => Error::Unreachable(format!(
                "router is not serving {context} (HTTP {})",
                self.status
            )),
            ResponseClass::Success | ResponseClass::Conflict | ResponseClass::Unexpected => {
                Error::MalformedResponse(format!(
                    "unexpected HTTP {} for {context}{detail}",
                    self.status
                ))
            }
        }
    }
}

fn summarize(payload: &Value) -> String {
    const LIMIT: usize = 200;
    let text = match payload {
        Value::Null => return String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut summary: String = text.chars().take(LIMIT).collect();
    if text.chars().count() > LIMIT {
        summary.push_str("...");
    }
    format!(": {summary}")
}

/// A request to one REST endpoint.
#[derive(Clone)]
pub struct RouterRequest {
    /// HTTP method.
    pub method: Method,
    /// Path below `/rest/v1/`.
    pub path: String,
    /// Bearer token of the session, if any.
    pub token: Option<SecretString>,
    /// JSON body.
    pub body: Option<Value>,
    redacted_path: Option<String>,
}

impl RouterRequest {
    /// Request with the given method and path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            token: None,
            body: None,
            redacted_path: None,
        }
    }

    /// GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Authenticate with a session token.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path to log instead of the real one, for paths embedding secrets.
    #[must_use]
    pub fn with_redacted_path(mut self, path: impl Into<String>) -> Self {
        self.redacted_path = Some(path.into());
        self
    }

    /// Path safe to log.
    #[must_use]
    pub fn display_path(&self) -> &str {
        self.redacted_path.as_deref().unwrap_or(&self.path)
    }
}

impl fmt::Debug for RouterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterRequest")
            .field("method", &self.method)
            .field("path", &self.display_path())
            .field("authenticated", &self.token.is_some())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Sends requests to the router and decodes its responses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// The router's base URL.
    fn base_url(&self) -> Url;

    /// Send a request and decode the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unreachable`] when no response arrives (after the
    /// configured retry) and [`Error::MalformedResponse`] when a successful
    /// response body is not JSON. Received non-success responses are returned
    /// as a [`Reply`], not as errors.
    async fn send(&self, request: RouterRequest) -> Result<Reply>;
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    base_url: Url,
    http_config: ClientConfig,
}

impl HttpTransportBuilder {
    /// Create a builder for the specified base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self {
            base_url,
            http_config: ClientConfig::default(),
        })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.http_config.retry_policy = retry;
        self
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_config.timeout = timeout;
        self
    }

    /// Build the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn build(self) -> Result<HttpTransport> {
        let client = reqwest::Client::builder()
            .timeout(self.http_config.timeout)
            .connect_timeout(self.http_config.timeout)
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::ConfigError(format!("cannot build HTTP client: {e}")))?;

        Ok(HttpTransport {
            client,
            base_url: self.base_url,
            config: self.http_config,
        })
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
}

impl HttpTransport {
    /// Construct a transport directly from the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        HttpTransportBuilder::new(base_url)?.build()
    }

    /// Construct a transport from router configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not form a valid URL.
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        HttpTransportBuilder::new(config.base_url()?)?
            .with_http_config(config.client_config())
            .build()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self
            .base_url
            .join(REST_PREFIX)?
            .join(path.trim_start_matches('/'))?)
    }

    fn build_request(&self, url: &Url, request: &RouterRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .header("Accept", "application/json")
            .header("Connection", "keep-alive");
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    async fn decode(response: reqwest::Response, request: &RouterRequest) -> Result<Reply> {
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            Error::Unreachable(format!(
                "connection dropped while reading {} {}: {e}",
                request.method,
                request.display_path()
            ))
        })?;

        let payload = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) if status.is_success() => {
                    return Err(Error::MalformedResponse(format!(
                        "{} {} returned a non-JSON body: {e}",
                        request.method,
                        request.display_path()
                    )));
                }
                Err(_) => Value::String(text),
            }
        };

        Ok(Reply::new(status, payload))
    }
}

/// Failures where nothing was received and trying again may help.
fn is_connection_failure(err: &reqwest::Error) -> bool {
    !err.is_timeout() && (err.is_connect() || err.is_request())
}

fn transport_error(err: reqwest::Error, request: &RouterRequest, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Unreachable(format!(
            "{} {} timed out after {timeout:?}",
            request.method,
            request.display_path(),
        ))
    } else {
        Error::Unreachable(format!(
            "{} {} failed: {}",
            request.method,
            request.display_path(),
            err.without_url()
        ))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn base_url(&self) -> Url {
        self.base_url.clone()
    }

    async fn send(&self, request: RouterRequest) -> Result<Reply> {
        let url = self.endpoint(&request.path)?;
        let policy = self.config.retry_policy;
        let mut attempt = 0;

        loop {
            let delay = policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            debug!(
                method = %request.method,
                path = request.display_path(),
                attempt,
                "router request"
            );

            match self.build_request(&url, &request).send().await {
                Ok(response) => {
                    let reply = Self::decode(response, &request).await?;
                    debug!(status = reply.status, class = ?reply.class, "router response");
                    return Ok(reply);
                }
                Err(err) if is_connection_failure(&err) && attempt < policy.max_retries => {
                    let err = err.without_url();
                    warn!(
                        method = %request.method,
                        path = request.display_path(),
                        error = %err,
                        "router connection failed, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(transport_error(err, &request, self.config.timeout)),
            }
        }
    }
}
