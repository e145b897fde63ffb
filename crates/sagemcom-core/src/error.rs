//! Error types for router operations.
//!
//! Every public operation returns exactly one of these kinds. Errors leaving the
//! port-forward service are wrapped in [`Error::Operation`], which names the
//! operation and its inputs so that an operator can act on the report without
//! digging into transport details.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Main error type for router operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Local address input could not be resolved to an IPv4 address
    #[error("Invalid address `{input}`: {reason}")]
    InvalidAddress {
        /// The user-supplied input
        input: String,
        /// Why the input was rejected
        reason: String,
    },

    /// Rule failed local validation before any request was sent
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Router rejected the credentials, or no password was available
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Another admin session is active on the router
    #[error("Concurrent session conflict: {0}")]
    ConcurrentSessionConflict(String),

    /// Router could not be reached or did not answer in time
    #[error("Router unreachable: {0}")]
    Unreachable(String),

    /// Router answered with a payload of unexpected shape
    #[error("Malformed router response: {0}")]
    MalformedResponse(String),

    /// A rule with the same external port or name already exists
    #[error("Rule conflict on external port {external_port}: {message}")]
    RuleConflict {
        /// External port of the rejected rule
        external_port: u16,
        /// Conflict details
        message: String,
    },

    /// No active rule carries the external port
    #[error("No port forward rule found for external port {external_port}")]
    RuleNotFound {
        /// External port that was looked up
        external_port: u16,
    },

    /// Router reported the session token as no longer valid
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The admin interface could not be opened in a browser
    #[error("Failed to open admin interface: {0}")]
    LaunchFailed(String),

    /// An operation failed; wraps the underlying kind
    #[error("{context} failed: {source}")]
    Operation {
        /// Operation and the inputs it was called with
        context: OperationContext,
        /// The error the operation ran into
        source: Box<Error>,
    },
}

/// The operation an error arose in, with its input parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// Operation name, e.g. `close`
    pub operation: &'static str,
    /// Rule name passed by the caller
    pub name: Option<String>,
    /// Local address as the caller wrote it
    pub local_address: Option<String>,
    /// Internal port
    pub local_port: Option<u16>,
    /// External port
    pub external_port: Option<u16>,
}

impl OperationContext {
    /// Context for `operation` with no inputs recorded yet.
    #[must_use]
    pub const fn new(operation: &'static str) -> Self {
        Self {
            operation,
            name: None,
            local_address: None,
            local_port: None,
            external_port: None,
        }
    }

    /// Record the rule name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Record the local address input.
    #[must_use]
    pub fn with_local_address(mut self, local_address: impl Into<String>) -> Self {
        self.local_address = Some(local_address.into());
        self
    }

    /// Record the internal port.
    #[must_use]
    pub const fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    /// Record the external port.
    #[must_use]
    pub const fn with_external_port(mut self, port: u16) -> Self {
        self.external_port = Some(port);
        self
    }

    fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("operation".to_string(), Value::from(self.operation));
        if let Some(name) = &self.name {
            details.insert("name".to_string(), Value::from(name.as_str()));
        }
        if let Some(address) = &self.local_address {
            details.insert("local_address".to_string(), Value::from(address.as_str()));
        }
        if let Some(port) = self.local_port {
            details.insert("local_port".to_string(), Value::from(port));
        }
        if let Some(port) = self.external_port {
            details.insert("external_port".to_string(), Value::from(port));
        }
        details
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation)?;
        let mut inputs = Vec::new();
        if let Some(name) = &self.name {
            inputs.push(format!("name `{name}`"));
        }
        if let Some(address) = &self.local_address {
            inputs.push(format!("local address `{address}`"));
        }
        if let Some(port) = self.local_port {
            inputs.push(format!("local port {port}"));
        }
        if let Some(port) = self.external_port {
            inputs.push(format!("external port {port}"));
        }
        if !inputs.is_empty() {
            write!(f, " ({})", inputs.join(", "))?;
        }
        Ok(())
    }
}

/// Specialized result type for router operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Always `"error"`, mirrors the success documents of the command surface
    pub status: &'static str,
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Operation errors report the code of the error they wrap.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "INVALID_ADDRESS",
            Self::InvalidRule(_) => "INVALID_RULE",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::ConcurrentSessionConflict(_) => "CONCURRENT_SESSION_CONFLICT",
            Self::Unreachable(_) => "UNREACHABLE",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::RuleConflict { .. } => "RULE_CONFLICT",
            Self::RuleNotFound { .. } => "RULE_NOT_FOUND",
            Self::SessionExpired(_) => "SESSION_EXPIRED",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::LaunchFailed(_) => "LAUNCH_FAILED",
            Self::Operation { source, .. } => source.error_code(),
        }
    }

    /// The underlying error kind, looking through operation context.
    #[must_use]
    pub fn kind(&self) -> &Self {
        match self {
            Self::Operation { source, .. } => source.kind(),
            other => other,
        }
    }

    /// Attach the failing operation and its inputs.
    ///
    /// An error that already carries a context keeps it.
    #[must_use]
    pub fn in_operation(self, context: OperationContext) -> Self {
        match self {
            Self::Operation { .. } => self,
            source => Self::Operation {
                context,
                source: Box::new(source),
            },
        }
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        let details = self.details().map(Value::Object);

        ErrorResponse {
            status: "error",
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details,
            },
        }
    }

    fn details(&self) -> Option<Map<String, Value>> {
        let mut details = Map::new();
        match self {
            Self::RuleConflict { external_port, .. } | Self::RuleNotFound { external_port } => {
                details.insert("external_port".to_string(), Value::from(*external_port));
            }
            Self::InvalidAddress { input, .. } => {
                details.insert("input".to_string(), Value::from(input.as_str()));
            }
            Self::Operation { context, source } => {
                details = context.details();
                for (key, value) in source.details().unwrap_or_default() {
                    details.entry(key).or_insert(value);
                }
            }
            _ => return None,
        }
        Some(details)
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub fn should_log(&self) -> bool {
        matches!(
            self.kind(),
            Self::MalformedResponse(_) | Self::ConfigError(_) | Self::Unreachable(_)
        )
    }

    /// Returns true if the router asked for a fresh login.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self.kind(), Self::SessionExpired(_))
    }

    /// Builds an [`Error::InvalidAddress`].
    pub fn invalid_address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid router URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(format!("Invalid configuration: {err}"))
    }
}
