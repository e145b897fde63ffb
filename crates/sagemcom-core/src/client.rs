//! HTTP client settings and retry policy.
//!
//! Router admin panels are slow and drop connections when several admin
//! sessions compete. Requests are therefore bounded by a timeout and retried a
//! fixed, small number of times on connection-level failures only.

use std::time::Duration;

/// Default request timeout for router requests (seconds)
pub const ROUTER_DEFAULT_TIMEOUT: u64 = 10;

/// Default number of retries after a connection-level failure
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default fixed delay before a retry in milliseconds
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Retry policy with a fixed backoff.
///
/// Only failures where no response was received are retried. A response of any
/// status is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Delay before each retry
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a retry policy with default values (one retry).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }

    /// Set the delay before each retry.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the given attempt; the first attempt (0) is immediate.
    #[must_use]
    pub const fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::from_secs(0)
        } else {
            self.backoff
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Retry policy
    pub retry_policy: RetryPolicy,
}

impl ClientConfig {
    /// Create a new client configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: Duration::from_secs(ROUTER_DEFAULT_TIMEOUT),
            retry_policy: RetryPolicy::new(),
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
