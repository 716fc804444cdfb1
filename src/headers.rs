//! Rate-limit feedback parsed from response headers.
//!
//! The server is the only authority on quotas, and everything it knows
//! arrives here: the bucket id it assigned to the route, the window size,
//! what's left in it, when it refreshes, and (on a 429) how long to back
//! off and whether the global limit was the one that tripped.
//!
//! Parsing is forgiving: a missing or malformed header degrades to `None`
//! rather than failing the request that carried it.

use std::collections::HashMap;
use std::time::Duration;

/// Header carrying the server-assigned bucket id for the route.
pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";
/// Header carrying the bucket's request limit per window.
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// Header carrying the requests left in the current window.
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Header carrying seconds (fractional) until the window refreshes.
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
/// Header carrying seconds (fractional) to wait after a 429.
pub const HEADER_RETRY_AFTER: &str = "retry-after";
/// Header flagging that the global limit, not the bucket's, was hit.
pub const HEADER_GLOBAL: &str = "x-ratelimit-global";

/// Quota feedback extracted from one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// Server-assigned bucket id, once known.
    pub bucket: Option<String>,
    /// Requests allowed per window.
    pub limit: Option<u32>,
    /// Requests left in the current window.
    pub remaining: Option<u32>,
    /// Time until the window refreshes.
    pub reset_after: Option<Duration>,
    /// Throttle duration advertised with a 429.
    pub retry_after: Option<Duration>,
    /// True when a 429 was the global limit rather than the bucket's.
    pub global: bool,
}

impl RateLimitHeaders {
    /// Extract quota feedback from a response's headers.
    ///
    /// Header names are matched case-insensitively.
    pub fn parse(headers: &HashMap<String, String>) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.trim())
        };

        Self {
            bucket: find(HEADER_BUCKET).map(str::to_owned),
            limit: find(HEADER_LIMIT).and_then(|v| v.parse().ok()),
            remaining: find(HEADER_REMAINING).and_then(|v| v.parse().ok()),
            reset_after: find(HEADER_RESET_AFTER).and_then(parse_seconds),
            retry_after: find(HEADER_RETRY_AFTER).and_then(parse_seconds),
            global: find(HEADER_GLOBAL).is_some_and(|v| v.eq_ignore_ascii_case("true")),
        }
    }

    /// True if the response carried any quota state worth applying.
    pub fn has_quota(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some() || self.reset_after.is_some()
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}
