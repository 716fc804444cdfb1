//! Dispatcher configuration.

use crate::backoff::Jitter;
use std::collections::HashSet;
use std::time::Duration;

/// Invalid configuration values, reported before the dispatcher is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(u32),
    /// `base_backoff` must be > 0.
    #[error("base_backoff must be > 0")]
    InvalidBaseBackoff,
    /// `max_backoff` must be >= `base_backoff`.
    #[error("max_backoff ({max:?}) must be >= base_backoff ({base:?})")]
    MaxBackoffBelowBase { base: Duration, max: Duration },
    /// `global_limit` must be > 0.
    #[error("global_limit must be > 0")]
    InvalidGlobalLimit,
    /// `global_window` must be > 0.
    #[error("global_window must be > 0")]
    InvalidGlobalWindow,
}

/// Tunables for the dispatcher.
///
/// The defaults suit a REST API in the 50-requests-per-second class with
/// per-route quotas discovered from response headers.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Total dispatch attempts per request (initial call + retries).
    pub max_attempts: u32,
    /// First retry delay for transient transport failures.
    pub base_backoff: Duration,
    /// Ceiling on the exponential retry delay.
    pub max_backoff: Duration,
    /// Jitter applied to transient-failure retry delays.
    pub jitter: Jitter,
    /// Requests allowed per global window, across all buckets.
    pub global_limit: u32,
    /// Length of the rolling global window.
    pub global_window: Duration,
    /// Path segments whose following resource id keys its own bucket.
    ///
    /// Most routes share one bucket per template (`/things/123` and
    /// `/things/456` rate-limit together), but the server scopes a fixed
    /// set of routes per resource; those parent segments are listed here.
    pub per_resource_parents: HashSet<String>,
    /// Deadline applied to requests that don't carry their own.
    pub default_deadline: Option<Duration>,
    /// How long an empty, idle bucket survives before eviction.
    pub idle_bucket_ttl: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            jitter: Jitter::Full,
            global_limit: 50,
            global_window: Duration::from_secs(1),
            per_resource_parents: ["channels", "guilds", "webhooks"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            default_deadline: None,
            idle_bucket_ttl: Duration::from_secs(300),
        }
    }
}

impl DispatcherConfig {
    /// Check the invariants the dispatcher relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(self.max_attempts));
        }
        if self.base_backoff.is_zero() {
            return Err(ConfigError::InvalidBaseBackoff);
        }
        if self.max_backoff < self.base_backoff {
            return Err(ConfigError::MaxBackoffBelowBase {
                base: self.base_backoff,
                max: self.max_backoff,
            });
        }
        if self.global_limit == 0 {
            return Err(ConfigError::InvalidGlobalLimit);
        }
        if self.global_window.is_zero() {
            return Err(ConfigError::InvalidGlobalWindow);
        }
        Ok(())
    }
}
