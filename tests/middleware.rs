//! The tower service front-end drives the same dispatch pipeline.

mod common;

use common::*;
use floodgate::{ApiRequest, DispatchService, Method};
use tower::ServiceExt;

#[tokio::test]
async fn service_dispatches_through_the_rate_limiter() {
    let transport = TestTransport::new(|_req, _nth| {
        reply(response(200, quota("B", 5, 4, 1.0), r#"{"id":1}"#))
    });
    let service = DispatchService::new(dispatcher(transport.clone()));

    let response = service
        .oneshot(ApiRequest::new(Method::Get, "/users/1"))
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn service_propagates_dispatch_errors() {
    let transport = TestTransport::new(|_req, _nth| reply(response(404, vec![], "not here")));
    let service = DispatchService::new(dispatcher(transport));

    let err = service
        .oneshot(ApiRequest::new(Method::Get, "/users/404"))
        .await
        .unwrap_err();

    assert!(err.is_client());
    assert_eq!(err.status(), Some(404));
}
