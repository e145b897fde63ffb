//! Router password sources.
//!
//! The password is resolved at call time and handed out as a
//! [`SecretString`], so it never reaches a log line or a `Debug` dump. An
//! empty or missing password is an authentication failure, not a crash.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Environment variable holding the router password.
pub const PASSWORD_ENV_VAR: &str = "SAGEMCOM_MODEM_PASSWORD";

/// Environment variable naming the 1Password item.
pub const ONEPASSWORD_ITEM_ENV_VAR: &str = "SAGEMCOM_ONEPASSWORD_ITEM";

/// 1Password item consulted when none is configured.
pub const DEFAULT_ONEPASSWORD_ITEM: &str = "Ziggo";

/// Something that can produce the router password on demand.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Resolve the password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] when no usable password exists.
    async fn password(&self) -> Result<SecretString>;

    /// Short description for diagnostics; never includes the secret.
    fn describe(&self) -> String;
}

fn non_empty(secret: SecretString, source: &str) -> Result<SecretString> {
    if secret.expose_secret().is_empty() {
        return Err(Error::AuthenticationFailed(format!(
            "{source} yielded an empty password"
        )));
    }
    Ok(secret)
}

/// A password supplied directly by the caller.
#[derive(Clone)]
pub struct ExplicitPassword(SecretString);

impl ExplicitPassword {
    /// Wrap a password value.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self(SecretString::from(password.into()))
    }
}

impl fmt::Debug for ExplicitPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExplicitPassword(..)")
    }
}

#[async_trait]
impl CredentialSource for ExplicitPassword {
    async fn password(&self) -> Result<SecretString> {
        non_empty(self.0.clone(), "explicit value")
    }

    fn describe(&self) -> String {
        "explicit value".to_string()
    }
}

/// A password read from an environment variable at call time.
#[derive(Debug, Clone)]
pub struct EnvPassword {
    var: String,
}

impl EnvPassword {
    /// Read from the given variable.
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvPassword {
    fn default() -> Self {
        Self::new(PASSWORD_ENV_VAR)
    }
}

#[async_trait]
impl CredentialSource for EnvPassword {
    async fn password(&self) -> Result<SecretString> {
        let value = std::env::var(&self.var).map_err(|_| {
            Error::AuthenticationFailed(format!("environment variable {} is not set", self.var))
        })?;
        non_empty(SecretString::from(value), &self.describe())
    }

    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }
}

#[derive(Deserialize)]
struct OpField {
    value: Option<String>,
}

/// Extracts the password from `op item get --format json` output.
fn parse_op_output(stdout: &str) -> Option<String> {
    serde_json::from_str::<OpField>(stdout)
        .ok()
        .and_then(|field| field.value)
}

/// A password looked up in 1Password through the `op` CLI.
#[derive(Debug, Clone)]
pub struct OnePasswordItem {
    item: String,
    program: String,
}

impl OnePasswordItem {
    /// Look up the named item.
    #[must_use]
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            program: "op".to_string(),
        }
    }

    /// Item name from `SAGEMCOM_ONEPASSWORD_ITEM`, falling back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let item = std::env::var(ONEPASSWORD_ITEM_ENV_VAR)
            .ok()
            .filter(|item| !item.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ONEPASSWORD_ITEM.to_string());
        Self::new(item)
    }

    /// Use a different `op` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// The item being looked up.
    #[must_use]
    pub fn item(&self) -> &str {
        &self.item
    }
}

#[async_trait]
impl CredentialSource for OnePasswordItem {
    async fn password(&self) -> Result<SecretString> {
        debug!(item = %self.item, "looking up router password in 1Password");
        let output = tokio::process::Command::new(&self.program)
            .args([
                "item",
                "get",
                self.item.as_str(),
                "--fields",
                "password",
                "--format",
                "json",
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::AuthenticationFailed(format!("failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(Error::AuthenticationFailed(format!(
                "1Password lookup of item `{}` failed with {}",
                self.item, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = parse_op_output(&stdout).ok_or_else(|| {
            Error::AuthenticationFailed(format!(
                "1Password item `{}` has no password field",
                self.item
            ))
        })?;
        non_empty(SecretString::from(value), &self.describe())
    }

    fn describe(&self) -> String {
        format!("1Password item `{}`", self.item)
    }
}

/// Tries several sources in order and returns the first password found.
#[derive(Default)]
pub struct CredentialChain {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialChain {
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The usual order: explicit value, `SAGEMCOM_MODEM_PASSWORD`, then 1Password.
    #[must_use]
    pub fn standard(explicit: Option<String>, onepassword_item: Option<String>) -> Self {
        let mut chain = Self::new();
        if let Some(password) = explicit {
            chain = chain.with_source(ExplicitPassword::new(password));
        }
        let onepassword =
            onepassword_item.map_or_else(OnePasswordItem::from_env, OnePasswordItem::new);
        chain
            .with_source(EnvPassword::default())
            .with_source(onepassword)
    }

    /// Append a source.
    #[must_use]
    pub fn with_source(mut self, source: impl CredentialSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Number of sources in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns true if the chain has no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl CredentialSource for CredentialChain {
    async fn password(&self) -> Result<SecretString> {
        for source in &self.sources {
            match source.password().await {
                Ok(password) => {
                    debug!(source = %source.describe(), "router password resolved");
                    return Ok(password);
                }
                Err(err) => {
                    debug!(source = %source.describe(), error = %err, "password source skipped");
                }
            }
        }

        warn!("no router password available from any source");
        Err(Error::AuthenticationFailed(format!(
            "could not retrieve the router password from {}",
            self.describe()
        )))
    }

    fn describe(&self) -> String {
        if self.sources.is_empty() {
            return "no configured source".to_string();
        }
        self.sources
            .iter()
            .map(|source| source.describe())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
