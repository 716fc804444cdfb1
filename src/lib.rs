#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # floodgate
//!
//! Rate-limit-aware request dispatch for REST APIs whose quotas are
//! discovered from response headers rather than known in advance.
//!
//! Many concurrent callers enqueue requests; floodgate keys each request
//! to a quota bucket, drains every bucket strictly in submission order
//! with at most one request in flight, honors a global limit shared by
//! all buckets, and transparently retries throttled (429) and transient
//! (network, 5xx) failures without reordering or duplicating work.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use floodgate::{ApiRequest, Dispatcher, DispatcherConfig, Method, Transport};
//! use std::sync::Arc;
//!
//! # async fn run(transport: Arc<dyn Transport>) -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::new(transport, DispatcherConfig::default())?;
//!
//! let response = dispatcher
//!     .enqueue(
//!         ApiRequest::new(Method::Post, "/channels/123/messages")
//!             .json(&serde_json::json!({"content": "hello"}))?,
//!     )
//!     .await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! The transport is yours to provide: implement [`Transport`] over your
//! HTTP client of choice. It sends exactly one request per call and never
//! retries; all scheduling and retry policy lives in the dispatcher.

pub mod backoff;
mod bucket;
pub mod config;
pub mod dispatcher;
pub mod error;
mod global;
pub mod headers;
pub mod middleware;
pub mod request;
pub mod route;
pub mod time;
pub mod transport;

// Re-exports
pub use backoff::{Jitter, RetrySchedule, MAX_BACKOFF};
pub use config::{ConfigError, DispatcherConfig};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use headers::RateLimitHeaders;
pub use middleware::DispatchService;
pub use request::ApiRequest;
pub use route::Method;
pub use time::{
    Clock, InstantSleeper, ManualClock, MonotonicClock, Sleeper, TokioSleeper, TrackingSleeper,
};
pub use transport::{Response, Transport, TransportError, TransportRequest};
