//! Batches over the real HTTP transport

use crate::integration::mock_server::{init_tracing, MockServerFixture};
use mockito::Matcher;
use parallel_requests::batch::BatchOrchestrator;
use parallel_requests::transport::http::REQUEST_ID_HEADER;
use parallel_requests::{Method, RequestDescriptor, TransportError};
use serde_json::json;

#[tokio::test]
async fn test_batch_partitions_http_statuses() {
    init_tracing();
    let fixture = MockServerFixture::new().await;
    let ok1 = fixture
        .mock_json("GET", "/items/1", 200, r#"{"id":1}"#)
        .await;
    let missing = fixture
        .mock_json("GET", "/items/2", 404, r#"{"error":"not found"}"#)
        .await;
    let ok3 = fixture
        .mock_json("GET", "/items/3", 200, r#"{"id":3}"#)
        .await;

    let batch: BatchOrchestrator<u32> = BatchOrchestrator::builder()
        .transport(fixture.transport())
        .method(Method::Get)
        .build(|id: &u32| format!("items/{}", id))
        .unwrap();

    batch.exec(vec![1, 2, 3]).unwrap();
    let snap = batch.settled().await.unwrap();

    assert_eq!(snap.succeeded, vec![1, 3]);
    assert_eq!(snap.failed, vec![2]);
    assert_eq!(snap.data, vec![json!({"id": 1}), json!({"id": 3})]);
    assert!(snap.responses.iter().all(|r| r.status == 200));
    match snap.errors[0].as_ref() {
        TransportError::Status { status, body } => {
            assert_eq!(*status, 404);
            assert!(body.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(batch.retry().map(|r| r.inputs().to_vec()), Some(vec![2]));

    ok1.assert_async().await;
    missing.assert_async().await;
    ok3.assert_async().await;
}

#[tokio::test]
async fn test_descriptor_fields_reach_the_wire() {
    init_tracing();
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_matching(
            "PATCH",
            "/users/7",
            Matcher::UrlEncoded("notify".into(), "true".into()),
            (
                REQUEST_ID_HEADER,
                Matcher::Regex(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$".into()),
            ),
            Matcher::Json(json!({"name": "Ada"})),
            r#"{"updated":true}"#,
        )
        .await;

    let batch: BatchOrchestrator<u32> = BatchOrchestrator::builder()
        .transport(fixture.transport())
        .method(Method::Patch)
        .build(|id: &u32| {
            RequestDescriptor::new()
                .url(format!("/users/{}", id))
                .param("notify", "true")
                .data(json!({"name": "Ada"}))
        })
        .unwrap();

    batch.exec(vec![7]).unwrap();
    let snap = batch.settled().await.unwrap();
    assert_eq!(snap.data, vec![json!({"updated": true})]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_default_headers_and_text_bodies() {
    init_tracing();
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("GET", "/health")
            .match_header("accept", "text/plain")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await
    };

    let transport = fixture.transport_with(fixture.config().with_default_header("accept", "text/plain"));
    let batch: BatchOrchestrator<()> = BatchOrchestrator::builder()
        .transport(transport)
        .build(|_: &()| "/health")
        .unwrap();

    batch.exec(vec![()]).unwrap();
    let snap = batch.settled().await.unwrap();
    assert_eq!(snap.data, vec![json!("ok")]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_descriptor_base_url_overrides_config() {
    init_tracing();
    let fixture = MockServerFixture::new().await;
    let other = MockServerFixture::new().await;
    let mock = other.mock_text("GET", "/ping", 200, "pong").await;

    let target = format!("{}/", other.base_url);
    let batch: BatchOrchestrator<String> = BatchOrchestrator::builder()
        .transport(fixture.transport())
        .build(move |path: &String| RequestDescriptor::new().base_url(target.clone()).url(path.clone()))
        .unwrap();

    batch.exec(vec!["ping".to_string()]).unwrap();
    let snap = batch.settled().await.unwrap();
    assert_eq!(snap.data, vec![json!("pong")]);
    mock.assert_async().await;
}
