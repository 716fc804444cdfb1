//! The transport collaborator boundary.
//!
//! The dispatcher owns scheduling, quota accounting, and retries; the
//! transport owns exactly one thing: putting a single request on the wire
//! and reporting what came back. Implementations must not retry
//! internally, or the dispatcher's ordering and attempt accounting break.

use crate::route::Method;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// One outbound call, fully assembled by the dispatcher.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// What the server sent back.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers; the dispatcher reads the rate-limit family.
    pub headers: HashMap<String, String>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl Response {
    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 4xx.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// 5xx.
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, lossily, for diagnostics.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure below the HTTP layer: the request never produced a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection-level failure (DNS, TCP, TLS, reset mid-stream).
    #[error("connection failed: {0}")]
    Connection(String),
    /// The transport's own I/O timeout elapsed.
    #[error("transport timed out")]
    Timeout,
}

/// A single-shot request sender.
///
/// `send` is invoked at most once per dispatch attempt; all retry policy
/// lives above this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<Response, TransportError>;
}
