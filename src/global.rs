//! The global limiter: one counter and window shared by every bucket.
//!
//! Purely bookkeeping — it holds no queue and never waits. Callers that
//! find no capacity are rescheduled by the dispatcher's drain loop using
//! [`GlobalLimiter::wait_hint`].

use std::time::Duration;

#[derive(Debug)]
pub(crate) struct GlobalLimiter {
    limit: u32,
    window_millis: u64,
    remaining: u32,
    reset_at: u64,
    /// Clock millis until which a global 429 holds all dispatch.
    paused_until: u64,
}

impl GlobalLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_millis: u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1),
            remaining: limit,
            reset_at: 0,
            paused_until: 0,
        }
    }

    /// Start a fresh window if the current one has elapsed.
    pub fn refresh_if_elapsed(&mut self, now: u64) {
        if now >= self.reset_at {
            self.remaining = self.limit;
            self.reset_at = now + self.window_millis;
        }
    }

    /// Non-blocking capacity check. Does not consume.
    pub fn acquire(&mut self, now: u64) -> bool {
        self.refresh_if_elapsed(now);
        now >= self.paused_until && self.remaining > 0
    }

    /// Charge one request against the window.
    pub fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// How long until capacity could exist again.
    pub fn wait_hint(&self, now: u64) -> Duration {
        let mut until = if self.remaining == 0 { self.reset_at } else { now };
        until = until.max(self.paused_until);
        Duration::from_millis(until.saturating_sub(now))
    }

    /// Hold all dispatch until the given instant (global 429).
    pub fn pause_until(&mut self, until: u64) {
        self.paused_until = self.paused_until.max(until);
    }
}
