//! Shared test plumbing: a scriptable transport and header builders.
#![allow(dead_code)] // each test binary uses a different subset

use async_trait::async_trait;
use floodgate::{
    Dispatcher, DispatcherConfig, Jitter, Response, Transport, TransportError, TransportRequest,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted transport outcome, with optional simulated latency.
pub struct Reply {
    pub result: Result<Response, TransportError>,
    pub delay: Duration,
}

pub fn reply(response: Response) -> Reply {
    Reply { result: Ok(response), delay: Duration::ZERO }
}

pub fn reply_after(response: Response, delay: Duration) -> Reply {
    Reply { result: Ok(response), delay }
}

pub fn fail(error: TransportError) -> Reply {
    Reply { result: Err(error), delay: Duration::ZERO }
}

pub fn response(status: u16, headers: Vec<(String, String)>, body: &str) -> Response {
    Response { status, headers: headers.into_iter().collect(), body: body.as_bytes().to_vec() }
}

pub fn ok() -> Response {
    response(200, vec![], "{}")
}

/// Quota headers the way the server reports them on every response.
pub fn quota(bucket: &str, limit: u32, remaining: u32, reset_after: f64) -> Vec<(String, String)> {
    vec![
        ("x-ratelimit-bucket".into(), bucket.into()),
        ("x-ratelimit-limit".into(), limit.to_string()),
        ("x-ratelimit-remaining".into(), remaining.to_string()),
        ("x-ratelimit-reset-after".into(), reset_after.to_string()),
    ]
}

/// 429 headers: retry-after plus the global flag when set.
pub fn throttle(retry_after: f64, global: bool) -> Vec<(String, String)> {
    let mut headers = vec![("retry-after".into(), retry_after.to_string())];
    if global {
        headers.push(("x-ratelimit-global".into(), "true".into()));
    }
    headers
}

/// Transport driven by a closure of `(request, nth call for this path)`.
pub struct TestTransport {
    handler: Box<dyn Fn(&TransportRequest, usize) -> Reply + Send + Sync>,
    calls: Mutex<Vec<TransportRequest>>,
    per_path: Mutex<HashMap<String, usize>>,
}

impl TestTransport {
    pub fn new(
        handler: impl Fn(&TransportRequest, usize) -> Reply + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            per_path: Mutex::new(HashMap::new()),
        })
    }

    /// Every request seen, in arrival order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Request bodies seen, decoded as UTF-8, in arrival order.
    pub fn bodies(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| String::from_utf8_lossy(r.body.as_deref().unwrap_or_default()).into_owned())
            .collect()
    }
}

#[async_trait]
impl Transport for TestTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response, TransportError> {
        let nth = {
            let mut per_path = self.per_path.lock().unwrap();
            let count = per_path.entry(request.path.clone()).or_insert(0);
            let nth = *count;
            *count += 1;
            nth
        };
        self.calls.lock().unwrap().push(request.clone());

        let reply = (self.handler)(&request, nth);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

/// Route dispatcher logs to the captured test output.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Config tuned for fast, deterministic tests.
pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        max_attempts: 3,
        base_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(200),
        jitter: Jitter::None,
        global_limit: 1_000,
        global_window: Duration::from_secs(1),
        ..Default::default()
    }
}

pub fn dispatcher(transport: Arc<TestTransport>) -> Dispatcher {
    Dispatcher::new(transport, test_config()).expect("test config is valid")
}
