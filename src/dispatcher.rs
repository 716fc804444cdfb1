//! The dispatcher: maps requests to buckets, drains buckets one request at
//! a time, folds server feedback back into quota state, and retries what
//! can be retried.
//!
//! Scheduling model: callers enqueue without blocking and await their own
//! completion handle. Each bucket with pending work is owned by exactly one
//! spawned drain task (the single-drainer invariant); the task dispatches
//! the head request when both the bucket and the global limiter allow it,
//! sleeps out any pause the server imposed, and exits when the queue runs
//! dry. All shared state lives behind one mutex that is never held across
//! an await.

use crate::backoff::RetrySchedule;
use crate::bucket::{Bucket, Dequeue};
use crate::config::{ConfigError, DispatcherConfig};
use crate::error::DispatchError;
use crate::global::GlobalLimiter;
use crate::headers::RateLimitHeaders;
use crate::request::{ApiRequest, QueuedRequest};
use crate::route;
use crate::time::{Clock, MonotonicClock, Sleeper, TokioSleeper};
use crate::transport::{Response, Transport, TransportError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Rate-limit-aware request dispatcher.
///
/// Clones share all state; hand clones to every call site that needs to
/// issue requests.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<DispatcherConfig>,
    schedule: RetrySchedule,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    state: Arc<Mutex<TableState>>,
}

struct TableState {
    buckets: HashMap<String, Bucket>,
    /// Discriminator -> server-assigned bucket id, learned from responses.
    /// Kept after bucket eviction: the mapping stays true even when the
    /// bucket's quota state has been dropped.
    aliases: HashMap<String, String>,
    global: GlobalLimiter,
    next_seq: u64,
}

/// What `settle` decided about the in-flight request.
enum Outcome {
    Resolve(QueuedRequest, Result<Response, DispatchError>),
    Requeued,
}

impl Dispatcher {
    /// Build a dispatcher over a transport, validating the configuration.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: DispatcherConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let schedule = RetrySchedule::new(config.base_backoff, config.max_backoff);
        let global = GlobalLimiter::new(config.global_limit, config.global_window);
        Ok(Self {
            config: Arc::new(config),
            schedule,
            transport,
            clock: Arc::new(MonotonicClock::default()),
            sleeper: Arc::new(TokioSleeper),
            state: Arc::new(Mutex::new(TableState {
                buckets: HashMap::new(),
                aliases: HashMap::new(),
                global,
                next_seq: 0,
            })),
        })
    }

    /// Override the clock (useful for deterministic tests). Call before
    /// the first enqueue.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Override the sleeper (useful for deterministic tests). Call before
    /// the first enqueue.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Queue a request and wait for its outcome.
    ///
    /// Returns immediately with `InvalidRequest` if the path cannot be
    /// keyed; nothing is enqueued in that case. Otherwise the request joins
    /// its bucket's FIFO queue and this future resolves exactly once: with
    /// the response, or with a terminal [`DispatchError`].
    pub async fn enqueue(&self, request: ApiRequest) -> Result<Response, DispatchError> {
        route::validate_path(&request.path)
            .map_err(|reason| DispatchError::InvalidRequest { reason })?;

        let deadline = request.deadline.or(self.config.default_deadline);
        let discriminator = route::discriminator(
            request.method,
            &request.path,
            &self.config.per_resource_parents,
        );
        let now = self.clock.now_millis();
        let (tx, rx) = oneshot::channel();

        let spawn_key = {
            let mut state = self.state.lock().unwrap();
            state.evict_idle(now, self.config.idle_bucket_ttl);

            let seq = state.next_seq;
            state.next_seq += 1;

            let key = state.aliases.get(&discriminator).cloned().unwrap_or(discriminator);
            let queued = QueuedRequest {
                seq,
                request: request.into_transport(),
                attempts: 0,
                not_before: 0,
                deadline,
                deadline_at: deadline.map(|d| now.saturating_add(millis(d))),
                tx,
            };

            let bucket = state
                .buckets
                .entry(key.clone())
                .or_insert_with(|| Bucket::new(key.clone(), now));
            bucket.enqueue(queued, now);
            tracing::debug!(bucket = %key, seq, "request queued");

            if bucket.drain_active {
                None
            } else {
                bucket.drain_active = true;
                Some(key)
            }
        };

        if let Some(key) = spawn_key {
            let this = self.clone();
            tokio::spawn(async move { this.drain(key).await });
        }

        match deadline {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result.unwrap_or_else(|_| Err(dropped())),
                Err(_) => Err(DispatchError::Timeout { after: limit }),
            },
            None => rx.await.unwrap_or_else(|_| Err(dropped())),
        }
    }

    /// Drive one bucket until its queue runs dry (or the bucket is handed
    /// to another drain task by a remap).
    async fn drain(self, mut key: String) {
        loop {
            let now = self.clock.now_millis();

            enum Step {
                Send(QueuedRequest),
                Sleep(Duration),
                Exit,
            }

            let (step, abandoned) = {
                let mut state = self.state.lock().unwrap();
                let TableState { buckets, global, .. } = &mut *state;
                let Some(bucket) = buckets.get_mut(&key) else {
                    // Bucket evicted underneath us; nothing left to own.
                    return;
                };

                let abandoned = bucket.take_abandoned(now);

                let step = if bucket.is_empty() {
                    bucket.drain_active = false;
                    Step::Exit
                } else if !global.acquire(now) {
                    Step::Sleep(global.wait_hint(now))
                } else {
                    match bucket.next_ready(now) {
                        Dequeue::Ready(request) => {
                            global.consume();
                            Step::Send(request)
                        }
                        Dequeue::Wait(wait) => Step::Sleep(wait),
                        Dequeue::Idle => {
                            // Only reachable if pruning emptied the queue;
                            // treat as done.
                            bucket.drain_active = false;
                            Step::Exit
                        }
                    }
                };
                (step, abandoned)
            };

            for request in abandoned {
                let after = request.deadline.unwrap_or(Duration::ZERO);
                tracing::debug!(bucket = %key, seq = request.seq, "deadline elapsed in queue");
                request.resolve(Err(DispatchError::Timeout { after }));
            }

            match step {
                Step::Exit => return,
                Step::Sleep(wait) => {
                    self.sleeper.sleep(wait.max(Duration::from_millis(1))).await;
                }
                Step::Send(request) => {
                    let seq = request.seq;
                    let attempt = request.attempts;
                    tracing::debug!(bucket = %key, seq, attempt, "dispatching");

                    let sent = self.transport.send(request.request.clone()).await;
                    let (outcome, keep_draining) = self.settle(&mut key, request, sent);
                    if let Outcome::Resolve(request, result) = outcome {
                        request.resolve(result);
                    }
                    if !keep_draining {
                        // A remap handed our queue to a bucket that already
                        // has a drain task; it takes over from here.
                        return;
                    }
                }
            }
        }
    }

    /// Classify one transport outcome and update quota state accordingly.
    ///
    /// Runs entirely under the state lock. `key` is rewritten in place when
    /// the response triggered a bucket remap; the returned flag is false
    /// when the remap merged our bucket into one that another drain task
    /// already owns.
    fn settle(
        &self,
        key: &mut String,
        request: QueuedRequest,
        sent: Result<Response, TransportError>,
    ) -> (Outcome, bool) {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap();
        let TableState { buckets, aliases, global, .. } = &mut *state;

        // Set when our bucket was merged away: its processing flag vanished
        // with it, and the merge target's in-flight state is not ours to
        // touch.
        let mut merged = false;
        let mut keep_draining = true;

        let outcome = match sent {
            Ok(response) => {
                let feedback = RateLimitHeaders::parse(&response.headers);

                // Fold in quota state, then re-key the bucket if the server
                // just told us its real id.
                let remap_target = buckets
                    .get_mut(key.as_str())
                    .and_then(|bucket| bucket.apply_headers(&feedback, now));
                if let Some(id) = remap_target {
                    if let Some(moved) = buckets.remove(key.as_str()) {
                        tracing::debug!(from = %key, to = %id, "bucket remapped to server id");
                        aliases.insert(key.clone(), id.clone());
                        match buckets.get_mut(&id) {
                            Some(existing) => {
                                // Requests landed under both keys before the
                                // id was known; the id-keyed entry inherits
                                // the queue and the fresher quota state.
                                existing.merge_from(moved);
                                merged = true;
                                if existing.drain_active {
                                    keep_draining = false;
                                } else {
                                    existing.drain_active = true;
                                }
                            }
                            None => {
                                let mut moved = moved;
                                moved.set_key(id.clone());
                                buckets.insert(id.clone(), moved);
                            }
                        }
                        *key = id;
                    }
                }

                if response.is_success() {
                    tracing::debug!(bucket = %key, seq = request.seq, status = response.status, "request completed");
                    Outcome::Resolve(request, Ok(response))
                } else if response.status == 429 {
                    let retry_after = feedback.retry_after.unwrap_or(self.config.base_backoff);
                    let until = now.saturating_add(millis(retry_after));
                    if feedback.global {
                        tracing::warn!(
                            retry_after_ms = millis(retry_after),
                            "global rate limit hit; pausing all dispatch"
                        );
                        global.pause_until(until);
                    } else {
                        tracing::warn!(
                            bucket = %key,
                            retry_after_ms = millis(retry_after),
                            "bucket rate limit hit; pausing bucket"
                        );
                        if let Some(bucket) = buckets.get_mut(key.as_str()) {
                            bucket.pause_until(until);
                        }
                    }

                    if request.attempts >= self.config.max_attempts {
                        tracing::warn!(
                            bucket = %key,
                            seq = request.seq,
                            attempts = request.attempts,
                            "rate limit retries exhausted"
                        );
                        let attempts = request.attempts;
                        Outcome::Resolve(
                            request,
                            Err(DispatchError::RateLimited {
                                bucket: key.clone(),
                                attempts,
                                retry_after,
                            }),
                        )
                    } else {
                        requeue(buckets, key, request);
                        Outcome::Requeued
                    }
                } else if response.is_client_error() {
                    tracing::debug!(
                        bucket = %key,
                        seq = request.seq,
                        status = response.status,
                        "client error; not retried"
                    );
                    Outcome::Resolve(
                        request,
                        Err(DispatchError::Client {
                            status: response.status,
                            body: response.body_text(),
                        }),
                    )
                } else {
                    // 5xx (and anything else unexpected): transient.
                    let status = response.status;
                    self.retry_transient(
                        buckets,
                        key,
                        request,
                        now,
                        Some(status),
                        format!("server returned {status}"),
                    )
                }
            }
            Err(err) => self.retry_transient(buckets, key, request, now, None, err.to_string()),
        };

        // Our in-flight slot only exists if our bucket survived the remap.
        if !merged {
            if let Some(bucket) = buckets.get_mut(key.as_str()) {
                bucket.release();
            }
        }

        (outcome, keep_draining)
    }

    /// Back off and requeue a transiently failed request, or give up once
    /// the attempt ceiling is reached.
    fn retry_transient(
        &self,
        buckets: &mut HashMap<String, Bucket>,
        key: &str,
        mut request: QueuedRequest,
        now: u64,
        last_status: Option<u16>,
        detail: String,
    ) -> Outcome {
        if request.attempts >= self.config.max_attempts {
            tracing::warn!(
                bucket = %key,
                seq = request.seq,
                attempts = request.attempts,
                detail = %detail,
                "transient failure; retries exhausted"
            );
            let attempts = request.attempts;
            return Outcome::Resolve(
                request,
                Err(DispatchError::Transient { attempts, last_status, detail }),
            );
        }

        let delay = self.config.jitter.apply(self.schedule.delay(request.attempts + 1));
        request.not_before = now.saturating_add(millis(delay));
        tracing::debug!(
            bucket = %key,
            seq = request.seq,
            attempt = request.attempts,
            backoff_ms = millis(delay),
            detail = %detail,
            "transient failure; will retry"
        );
        requeue(buckets, key, request);
        Outcome::Requeued
    }
}

impl TableState {
    fn evict_idle(&mut self, now: u64, ttl: Duration) {
        self.buckets.retain(|_, bucket| !bucket.is_idle(now, ttl));
    }
}

fn requeue(buckets: &mut HashMap<String, Bucket>, key: &str, request: QueuedRequest) {
    match buckets.get_mut(key) {
        Some(bucket) => bucket.requeue_front(request),
        // The bucket vanished mid-flight; the request has nowhere to wait.
        None => request.resolve(Err(dropped())),
    }
}

fn dropped() -> DispatchError {
    DispatchError::Transient {
        attempts: 0,
        last_status: None,
        detail: "request dropped before completion".into(),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
