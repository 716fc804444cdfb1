//! Request construction: what callers hand to the dispatcher, and the
//! queued form the dispatcher tracks until completion.

use crate::error::DispatchError;
use crate::route::Method;
use crate::transport::{Response, TransportRequest};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::oneshot;

/// One unit of caller work, built up and handed to
/// [`Dispatcher::enqueue`](crate::Dispatcher::enqueue).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) deadline: Option<Duration>,
}

impl ApiRequest {
    /// Start a request for a method and path (e.g. `/channels/123/messages`).
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: Vec::new(), body: None, deadline: None }
    }

    /// Append a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body, setting `content-type`.
    pub fn json<T: Serialize>(mut self, payload: &T) -> Result<Self, DispatchError> {
        let body = serde_json::to_vec(payload).map_err(|e| DispatchError::InvalidRequest {
            reason: format!("payload failed to serialize: {e}"),
        })?;
        self.headers.push(("content-type".into(), "application/json".into()));
        self.body = Some(body);
        Ok(self)
    }

    /// Attach a raw body.
    pub fn body(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(bytes);
        self
    }

    /// Fail the request with `Timeout` if it hasn't completed within `deadline`.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn into_transport(self) -> TransportRequest {
        TransportRequest {
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// A request sitting in a bucket queue, waiting for its turn.
#[derive(Debug)]
pub(crate) struct QueuedRequest {
    /// Global submission order; FIFO tie-break across queue merges.
    pub seq: u64,
    /// The assembled outbound call, reused verbatim on every attempt.
    pub request: TransportRequest,
    /// Dispatch attempts performed so far.
    pub attempts: u32,
    /// Clock millis before which this request must not be dispatched.
    pub not_before: u64,
    /// The deadline the caller asked for, if any.
    pub deadline: Option<Duration>,
    /// Clock millis at which that deadline elapses.
    pub deadline_at: Option<u64>,
    /// Completion handle; consumed on resolution, so a request can only
    /// ever resolve once.
    pub tx: oneshot::Sender<Result<Response, DispatchError>>,
}

impl QueuedRequest {
    /// True once there is no point dispatching: the deadline passed or the
    /// caller hung up.
    pub fn is_abandoned(&self, now_millis: u64) -> bool {
        self.tx.is_closed() || self.deadline_at.is_some_and(|at| now_millis >= at)
    }

    /// Resolve the caller. A receiver that already timed out is gone;
    /// dropping the result then is correct.
    pub fn resolve(self, result: Result<Response, DispatchError>) {
        let _ = self.tx.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn json_sets_body_and_content_type() {
        let req = ApiRequest::new(Method::Post, "/messages")
            .json(&serde_json::json!({"content": "hi"}))
            .unwrap();
        assert!(req.headers.iter().any(|(k, v)| k == "content-type" && v == "application/json"));
        assert_eq!(req.body.as_deref(), Some(br#"{"content":"hi"}"# as &[u8]));
    }

    #[test]
    fn headers_accumulate_in_order() {
        let req = ApiRequest::new(Method::Get, "/x")
            .header("a", "1")
            .header("b", "2");
        assert_eq!(req.headers, vec![("a".into(), "1".into()), ("b".into(), "2".into())]);
    }

    #[test]
    fn queued_request_abandonment() {
        let (tx, rx) = oneshot::channel();
        let mut queued = QueuedRequest {
            seq: 1,
            request: ApiRequest::new(Method::Get, "/x").into_transport(),
            attempts: 0,
            not_before: 0,
            deadline: Some(Duration::from_millis(100)),
            deadline_at: Some(100),
            tx,
        };
        assert!(!queued.is_abandoned(99));
        assert!(queued.is_abandoned(100));

        queued.deadline_at = None;
        drop(rx);
        assert!(queued.is_abandoned(0), "closed receiver abandons the request");
    }

    #[test]
    fn resolve_consumes_the_handle() {
        let (tx, mut rx) = oneshot::channel();
        let queued = QueuedRequest {
            seq: 1,
            request: ApiRequest::new(Method::Get, "/x").into_transport(),
            attempts: 1,
            not_before: 0,
            deadline: None,
            deadline_at: None,
            tx,
        };
        queued.resolve(Ok(Response { status: 200, headers: HashMap::new(), body: vec![] }));
        assert_eq!(rx.try_recv().unwrap().unwrap().status, 200);
    }
}
