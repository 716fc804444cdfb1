//! tower front-end over the dispatcher.

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::request::ApiRequest;
use crate::transport::Response;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower_service::Service;

/// [`Service`] adapter so the dispatcher can sit in a tower stack.
///
/// Admission control happens in the bucket queues, not here, so the
/// service is always ready; rate-limit pressure shows up as latency on the
/// returned future rather than as `poll_ready` backpressure.
#[derive(Clone)]
pub struct DispatchService {
    dispatcher: Dispatcher,
}

impl DispatchService {
    /// Wrap a dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

impl Service<ApiRequest> for DispatchService {
    type Response = Response;
    type Error = DispatchError;
    type Future = BoxFuture<'static, Result<Response, DispatchError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ApiRequest) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        Box::pin(async move { dispatcher.enqueue(request).await })
    }
}
