//! Single-request siblings over the real HTTP transport

use crate::integration::mock_server::{init_tracing, MockServerFixture};
use mockito::Matcher;
use parallel_requests::single::{get_data, RequestCallback};
use parallel_requests::{Method, RequestDescriptor, RequestTemplate};
use serde_json::json;

#[tokio::test]
async fn test_get_data_loads_on_start() {
    init_tracing();
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_json("GET", "/config", 200, r#"{"feature":"on"}"#)
        .await;

    // method is forced to GET
    let request = get_data(RequestDescriptor::new().method(Method::Post).url("/config"))
        .unwrap()
        .transport(fixture.transport())
        .start()
        .unwrap();

    let snap = request.settled().await.unwrap();
    assert_eq!(snap.data, Some(json!({"feature": "on"})));
    assert!(snap.error.is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_data_request_error_then_retry() {
    init_tracing();
    let fixture = MockServerFixture::new().await;
    let failing = {
        let mut server = fixture.server.lock().await;
        server
            .mock("GET", "/flaky")
            .with_status(503)
            .with_body("busy")
            .expect(2)
            .create_async()
            .await
    };

    let request = get_data("/flaky")
        .unwrap()
        .transport(fixture.transport())
        .start()
        .unwrap();
    let snap = request.settled().await.unwrap();
    assert_eq!(snap.error.as_ref().and_then(|e| e.status()), Some(503));
    assert_eq!(snap.retries_count, 0);

    request.retry().unwrap();
    assert!(request.is_loading());
    assert!(request.snapshot().error.is_none());
    let snap = request.settled().await.unwrap();
    assert_eq!(snap.retries_count, 1);
    assert_eq!(snap.generation, 2);
    assert_eq!(snap.error.as_ref().and_then(|e| e.status()), Some(503));
    assert!(snap.data.is_none());
    failing.assert_async().await;
}

#[tokio::test]
async fn test_post_callback_sends_body_per_input() {
    init_tracing();
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", "/messages")
            .match_body(Matcher::Json(json!({"text": "hello"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"m1"}"#)
            .create_async()
            .await
    };

    let send = RequestCallback::builder(RequestTemplate::from_fn(|text: &String| {
        RequestDescriptor::new()
            .url("/messages")
            .data(json!({ "text": text }))
    }))
    .transport(fixture.transport())
    .method(Method::Post)
    .build()
    .unwrap();

    send.exec("hello".to_string()).unwrap();
    let snap = send.settled().await.unwrap();
    assert_eq!(snap.response.as_ref().map(|r| r.status), Some(201));
    assert_eq!(snap.data, Some(json!({"id": "m1"})));
    mock.assert_async().await;
}
