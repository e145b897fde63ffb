//! Configuration for router clients.
//!
//! This module provides the connection settings for a single router: where it
//! lives, how long to wait for it, and which LAN subnet shorthand addresses
//! expand against.

use crate::address::SubnetPrefix;
use crate::client::{ClientConfig, RetryPolicy};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default router address on the LAN.
pub const DEFAULT_ROUTER_HOST: &str = "192.168.178.1";

/// Default router admin port.
pub const DEFAULT_ROUTER_PORT: u16 = 80;

/// Environment variable overriding the router host.
pub const HOST_ENV_VAR: &str = "SAGEMCOM_MODEM_IP";

/// Configuration for a router client instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RouterConfig {
    /// Router host name or IPv4 address
    #[validate(length(min = 1))]
    #[serde(default = "default_host")]
    pub host: String,

    /// Router admin HTTP port
    #[validate(range(min = 1))]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 120))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Delay before retrying a failed connection, in milliseconds
    #[validate(range(max = 10_000))]
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// LAN prefix for shorthand addresses; derived from `host` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_prefix: Option<SubnetPrefix>,

    /// 1Password item holding the router password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onepassword_item: Option<String>,
}

fn default_host() -> String {
    DEFAULT_ROUTER_HOST.to_string()
}

const fn default_port() -> u16 {
    DEFAULT_ROUTER_PORT
}

const fn default_request_timeout_secs() -> u64 {
    crate::client::ROUTER_DEFAULT_TIMEOUT
}

const fn default_retry_backoff_ms() -> u64 {
    crate::client::DEFAULT_RETRY_BACKOFF_MS
}

impl RouterConfig {
    /// Create a configuration for the given router host.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn new(host: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            host: host.into(),
            ..Self::default()
        };
        config.check()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first invalid field.
    pub fn check(&self) -> Result<(), Error> {
        self.validate()?;
        self.base_url()?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup(HOST_ENV_VAR).filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        self
    }

    /// Set the router host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the router admin port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the retry backoff in milliseconds.
    #[must_use]
    pub const fn with_retry_backoff(mut self, millis: u64) -> Self {
        self.retry_backoff_ms = millis;
        self
    }

    /// Set the LAN subnet prefix explicitly.
    #[must_use]
    pub const fn with_subnet_prefix(mut self, prefix: SubnetPrefix) -> Self {
        self.subnet_prefix = Some(prefix);
        self
    }

    /// Set the 1Password item name.
    #[must_use]
    pub fn with_onepassword_item(mut self, item: impl Into<String>) -> Self {
        self.onepassword_item = Some(item.into());
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// HTTP settings derived from this configuration.
    #[must_use]
    pub const fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_timeout(self.timeout())
            .with_retry_policy(
                RetryPolicy::new().with_backoff(Duration::from_millis(self.retry_backoff_ms)),
            )
    }

    /// The router's base URL, e.g. `http://192.168.178.1:80`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot form a URL.
    pub fn base_url(&self) -> Result<Url, Error> {
        Url::parse(&format!("http://{}:{}", self.host.trim(), self.port))
            .map_err(|e| Error::ConfigError(format!("Invalid router URL: {e}")))
    }

    /// The subnet prefix used to expand shorthand addresses.
    ///
    /// # Errors
    ///
    /// Returns an error when no prefix is configured and the host is not an
    /// IPv4 address it could be derived from.
    pub fn subnet_prefix(&self) -> Result<SubnetPrefix, Error> {
        if let Some(prefix) = self.subnet_prefix {
            return Ok(prefix);
        }

        self.host
            .trim()
            .parse::<Ipv4Addr>()
            .map(SubnetPrefix::from_address)
            .map_err(|_| {
                Error::ConfigError(format!(
                    "cannot derive a subnet prefix from host `{}`; set subnet_prefix",
                    self.host
                ))
            })
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            subnet_prefix: None,
            onepassword_item: None,
        }
    }
}
