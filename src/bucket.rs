//! Per-route quota bucket: a FIFO queue plus the window state inferred
//! from server feedback.
//!
//! Invariants:
//! - At most one request per bucket is in flight (`processing`); a second
//!   dequeue is impossible until [`Bucket::release`].
//! - Requests leave the queue in submission order, always from the head.
//! - `remaining` is clamped at zero; local decrements are a provisional
//!   estimate and the next response's headers overwrite them.
//! - Until the server confirms a quota, a bucket has no window constraint
//!   at all; the one-in-flight rule alone paces it.

use crate::headers::RateLimitHeaders;
use crate::request::QueuedRequest;
use std::collections::VecDeque;
use std::time::Duration;

/// Outcome of asking a bucket for its next dispatchable request.
#[derive(Debug)]
pub(crate) enum Dequeue {
    /// Head request, dequeued; `processing` is now set.
    Ready(QueuedRequest),
    /// Nothing can go out yet; check back after this long.
    Wait(Duration),
    /// Queue empty or a request already in flight.
    Idle,
}

#[derive(Debug)]
pub(crate) struct Bucket {
    key: String,
    /// Window size. Meaningful only once `confirmed`.
    limit: u32,
    /// Requests left in the current window, by local estimate.
    remaining: u32,
    /// Clock millis at which the window refreshes.
    reset_at: u64,
    /// Set once the server has reported quota state for this bucket.
    confirmed: bool,
    /// Clock millis until which a 429 paused this bucket.
    paused_until: u64,
    queue: VecDeque<QueuedRequest>,
    /// One request is on the wire.
    pub processing: bool,
    /// A drain task owns this bucket.
    pub drain_active: bool,
    /// Last enqueue/dispatch activity, for idle eviction.
    pub last_active: u64,
}

impl Bucket {
    pub fn new(key: String, now: u64) -> Self {
        Self {
            key,
            limit: 1,
            remaining: 1,
            reset_at: 0,
            confirmed: false,
            paused_until: 0,
            queue: VecDeque::new(),
            processing: false,
            drain_active: false,
            last_active: now,
        }
    }

    pub fn set_key(&mut self, key: String) {
        self.key = key;
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Append to the tail. Never blocks; completion is signaled through the
    /// request's own handle.
    pub fn enqueue(&mut self, request: QueuedRequest, now: u64) {
        self.last_active = now;
        self.queue.push_back(request);
    }

    /// Put a retried request back at the head so it keeps its place ahead
    /// of everything submitted after it.
    pub fn requeue_front(&mut self, request: QueuedRequest) {
        self.queue.push_front(request);
    }

    /// Remove queued requests whose deadline passed or whose caller hung
    /// up. Returned entries still need their `Timeout` resolution.
    pub fn take_abandoned(&mut self, now: u64) -> Vec<QueuedRequest> {
        let mut abandoned = Vec::new();
        let mut kept = VecDeque::with_capacity(self.queue.len());
        for request in self.queue.drain(..) {
            if request.is_abandoned(now) {
                abandoned.push(request);
            } else {
                kept.push_back(request);
            }
        }
        self.queue = kept;
        abandoned
    }

    /// The tryDequeue step: hand out the head request if the bucket can
    /// dispatch right now.
    ///
    /// Refreshes an elapsed window first, honors a 429 pause and the head
    /// request's backoff gate, and on success marks the bucket processing,
    /// charges the window provisionally, and bumps the attempt counter.
    pub fn next_ready(&mut self, now: u64) -> Dequeue {
        if self.processing || self.queue.is_empty() {
            return Dequeue::Idle;
        }

        let mut blocked_until = self.paused_until;
        if let Some(head) = self.queue.front() {
            blocked_until = blocked_until.max(head.not_before);
        }
        if blocked_until > now {
            return Dequeue::Wait(Duration::from_millis(blocked_until - now));
        }

        if self.confirmed {
            if now >= self.reset_at {
                self.remaining = self.limit;
            }
            if self.remaining == 0 {
                return Dequeue::Wait(Duration::from_millis(
                    self.reset_at.saturating_sub(now).max(1),
                ));
            }
            self.remaining = self.remaining.saturating_sub(1);
        }

        match self.queue.pop_front() {
            Some(mut request) => {
                request.attempts += 1;
                self.processing = true;
                self.last_active = now;
                Dequeue::Ready(request)
            }
            None => Dequeue::Idle,
        }
    }

    /// Fold server-reported quota into local state. The server is
    /// authoritative; whatever it says replaces the local estimate.
    ///
    /// Returns the server-assigned bucket id when it differs from this
    /// bucket's key, signaling the dispatcher to remap.
    pub fn apply_headers(&mut self, feedback: &RateLimitHeaders, now: u64) -> Option<String> {
        if let Some(limit) = feedback.limit {
            self.limit = limit.max(1);
            self.confirmed = true;
        }
        if let Some(remaining) = feedback.remaining {
            self.remaining = remaining;
            self.confirmed = true;
        }
        if let Some(reset_after) = feedback.reset_after {
            self.reset_at = now + u64::try_from(reset_after.as_millis()).unwrap_or(u64::MAX);
        }
        feedback.bucket.as_ref().filter(|id| **id != self.key).cloned()
    }

    /// Clear `processing`, letting the next queued request through.
    pub fn release(&mut self) {
        self.processing = false;
    }

    /// Hold all dispatch from this bucket until the given instant.
    pub fn pause_until(&mut self, until: u64) {
        self.paused_until = self.paused_until.max(until);
    }

    /// Absorb another bucket's queue and quota state, interleaving the
    /// queues by original submission order. The donor's quota is adopted
    /// when server-confirmed: the response that triggered the merge is the
    /// latest observation of this bucket.
    pub fn merge_from(&mut self, mut other: Bucket) {
        self.queue.append(&mut other.queue);
        self.queue.make_contiguous().sort_by_key(|r| r.seq);
        if other.confirmed {
            self.limit = other.limit;
            self.remaining = other.remaining;
            self.reset_at = other.reset_at;
            self.confirmed = true;
        }
        self.paused_until = self.paused_until.max(other.paused_until);
        self.last_active = self.last_active.max(other.last_active);
    }

    /// Eviction test: empty, unowned, and quiet past the TTL.
    pub fn is_idle(&self, now: u64, ttl: Duration) -> bool {
        self.queue.is_empty()
            && !self.processing
            && !self.drain_active
            && now.saturating_sub(self.last_active)
                >= u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
    }
}
