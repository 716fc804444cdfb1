//! Error taxonomy for dispatched requests.
//!
//! Recoverable conditions (throttles, transient transport failures) are
//! absorbed by the dispatcher's retry loop and only surface here once the
//! attempt ceiling or a deadline is hit. Everything else reaches the caller
//! unchanged, with server-provided detail preserved for diagnostics.

use std::time::Duration;

/// Terminal outcome of a dispatched request.
///
/// Every enqueued request resolves exactly once, either with a response or
/// with one of these.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// The server kept throttling the request until the attempt ceiling.
    #[error("rate limited on bucket {bucket} after {attempts} attempts (last retry-after {retry_after:?})")]
    RateLimited {
        /// Bucket key the request was queued under.
        bucket: String,
        /// Dispatch attempts performed.
        attempts: u32,
        /// The server's last advertised retry-after.
        retry_after: Duration,
    },

    /// Transport kept failing (network error or 5xx) until the attempt ceiling.
    #[error("transient failure after {attempts} attempts: {detail}")]
    Transient {
        /// Dispatch attempts performed.
        attempts: u32,
        /// Status of the last 5xx observed, if the failure was HTTP-level.
        last_status: Option<u16>,
        /// Human-readable description of the last failure.
        detail: String,
    },

    /// Non-retryable client error (4xx other than 429).
    #[error("client error {status}: {body}")]
    Client {
        /// HTTP status returned by the server.
        status: u16,
        /// Raw response body, preserved for diagnostics.
        body: String,
    },

    /// The request's deadline elapsed before it completed.
    #[error("request timed out after {after:?}")]
    Timeout {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The request was malformed and never enqueued.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong with it.
        reason: String,
    },
}

impl DispatchError {
    /// True if this is a rate-limit exhaustion.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// True if this is a transient-failure exhaustion.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// True if this is a non-retryable client error.
    pub fn is_client(&self) -> bool {
        matches!(self, Self::Client { .. })
    }

    /// True if the request's deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True if the request was rejected before enqueueing.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }

    /// The HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } => Some(*status),
            Self::Transient { last_status, .. } => *last_status,
            _ => None,
        }
    }

    /// Dispatch attempts performed before giving up, if tracked.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RateLimited { attempts, .. } | Self::Transient { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}
