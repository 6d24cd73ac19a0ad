//! Webhook Integration Tests
//!
//! Exercise the webhook router in-process with `tower::ServiceExt::oneshot`.
//!
//! Run with: cargo test -p integration-tests --test webhook_tests

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use integration_tests::{
    deflate, test_config, test_context, webhook_challenge, webhook_event, RecordingHandler,
    WEBHOOK_ROUTE,
};
use kook_common::{AppConfig, TransportMode};
use kook_gateway::webhook::encrypt;
use kook_gateway::{ClientContext, FrameSource, Signal, WebhookFrameSource};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ENCRYPT_KEY: &str = "0123456789abcdef";

struct Harness {
    app: Router,
    ctx: ClientContext,
    handler: Arc<RecordingHandler>,
    _dir: tempfile::TempDir,
}

fn harness_with(configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(TransportMode::Webhook, dir.path());
    configure(&mut config);

    let (ctx, _, handler) = test_context(config);
    let source = WebhookFrameSource::new(ctx.clone()).unwrap();
    Harness {
        app: source.router(),
        ctx,
        handler,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

async fn post(app: &Router, uri: &str, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn plain_uri() -> String {
    format!("{WEBHOOK_ROUTE}?compress=0")
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_compressed_event_dispatched() {
    let h = harness();
    let event = webhook_event(1, "hello");

    let (status, body) = post(&h.app, WEBHOOK_ROUTE, deflate(event.to_string().as_bytes())).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let frames = h.handler.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].signal(), Signal::Event);
    assert_eq!(frames[0].sequence(), Some(1));
    assert_eq!(frames[0].payload(), &event["d"]);
    assert_eq!(h.ctx.session.sequence(), 1);
}

#[tokio::test]
async fn test_uncompressed_event_with_query_flag() {
    let h = harness();

    let (status, _) = post(&h.app, &plain_uri(), webhook_event(1, "plain").to_string().into_bytes()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.handler.len(), 1);

    // Without the flag the plain body is treated as compressed and fails to inflate
    let (status, _) = post(&h.app, WEBHOOK_ROUTE, webhook_event(2, "plain").to_string().into_bytes()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.handler.len(), 1);
}

#[tokio::test]
async fn test_compression_disabled_by_config() {
    let h = harness_with(|config| config.webhook.compress = false);

    let (status, _) = post(&h.app, WEBHOOK_ROUTE, webhook_event(1, "x").to_string().into_bytes()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.handler.len(), 1);
}

#[tokio::test]
async fn test_encrypted_event() {
    let h = harness_with(|config| config.webhook.encrypt_key = Some(ENCRYPT_KEY.to_string()));

    let event = webhook_event(5, "secret");
    let sealed = encrypt(event.to_string().as_bytes(), ENCRYPT_KEY, b"fedcba9876543210").unwrap();
    let envelope = json!({ "encrypt": sealed }).to_string();

    let (status, _) = post(&h.app, WEBHOOK_ROUTE, deflate(envelope.as_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.handler.sequences(), Vec::<Option<u64>>::new());
    assert_eq!(h.ctx.session.buffered_len(), 1);

    let sealed = encrypt(webhook_event(1, "first").to_string().as_bytes(), ENCRYPT_KEY, b"fedcba9876543210").unwrap();
    let envelope = json!({ "encrypt": sealed }).to_string();
    let (status, _) = post(&h.app, WEBHOOK_ROUTE, deflate(envelope.as_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.handler.sequences(), vec![Some(1)]);

    // Plain body where an encrypted one is expected
    let (status, _) = post(&h.app, &plain_uri(), webhook_event(2, "x").to_string().into_bytes()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_requests_keep_highest_sequence() {
    let h = harness();

    let mut order: Vec<u64> = (1..=30).collect();
    order.reverse();
    order.swap(3, 17);

    let requests = order.into_iter().map(|sn| {
        let app = h.app.clone();
        tokio::spawn(async move {
            let body = deflate(webhook_event(sn, "burst").to_string().as_bytes());
            post(&app, WEBHOOK_ROUTE, body).await.0
        })
    });
    for request in requests.collect::<Vec<_>>() {
        assert_eq!(request.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(h.ctx.session.sequence(), 30);
    assert_eq!(h.ctx.session.buffered_len(), 0);
    let expected: Vec<_> = (1..=30).map(Some).collect();
    assert_eq!(h.handler.sequences(), expected);
}

// ============================================================================
// Verification
// ============================================================================

#[tokio::test]
async fn test_challenge_echoed() {
    let h = harness();

    let body = deflate(webhook_challenge("bkes0b").to_string().as_bytes());
    let (status, body) = post(&h.app, WEBHOOK_ROUTE, body).await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({ "challenge": "bkes0b" }));
    assert!(h.handler.is_empty());
    assert_eq!(h.ctx.session.sequence(), 0);
}

#[tokio::test]
async fn test_verify_token_mismatch_rejected() {
    let h = harness();

    let mut event = webhook_event(1, "forged");
    event["d"]["verify_token"] = json!("wrong");
    let (status, body) = post(&h.app, WEBHOOK_ROUTE, deflate(event.to_string().as_bytes())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_empty());
    assert!(h.handler.is_empty());
    assert_eq!(h.ctx.session.sequence(), 0);
}

#[tokio::test]
async fn test_malformed_requests_rejected() {
    let h = harness();

    let bodies: Vec<(String, Vec<u8>)> = vec![
        (WEBHOOK_ROUTE.to_string(), Vec::new()),
        (plain_uri(), b"{not json".to_vec()),
        (plain_uri(), json!({"s": 0, "sn": 1}).to_string().into_bytes()),
        (plain_uri(), json!({"s": 0, "sn": 1, "d": {}}).to_string().into_bytes()),
        (plain_uri(), json!({"s": 9, "sn": 1, "d": {"verify_token": "verify-me"}}).to_string().into_bytes()),
        (
            plain_uri(),
            json!({"s": 0, "d": {"channel_type": "WEBHOOK_CHALLENGE", "verify_token": "verify-me"}})
                .to_string()
                .into_bytes(),
        ),
    ];

    for (uri, body) in bodies {
        let (status, response) = post(&h.app, &uri, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {uri}");
        assert!(response.is_empty());
    }

    assert!(h.handler.is_empty());
    assert_eq!(h.ctx.session.sequence(), 0);
}

#[tokio::test]
async fn test_other_routes_not_served() {
    let h = harness();

    let (status, _) = post(&h.app, "/elsewhere", deflate(b"{}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("GET")
        .uri(WEBHOOK_ROUTE)
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ============================================================================
// Sequence persistence
// ============================================================================

#[tokio::test]
async fn test_sequence_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (ctx, _, _) = test_context(test_config(TransportMode::Webhook, dir.path()));
    let source = WebhookFrameSource::new(ctx.clone()).unwrap();
    source.start().await.unwrap();
    assert!(source.is_connected());

    let app = source.router();
    for sn in 1..=3 {
        let body = deflate(webhook_event(sn, "persisted").to_string().as_bytes());
        assert_eq!(post(&app, WEBHOOK_ROUTE, body).await.0, StatusCode::OK);
    }
    source.stop().await;

    let (ctx, _, handler) = test_context(test_config(TransportMode::Webhook, dir.path()));
    let source = WebhookFrameSource::new(ctx.clone()).unwrap();
    source.start().await.unwrap();
    assert_eq!(ctx.session.sequence(), 3);

    // Numbering continues from the restored position
    let app = source.router();
    let body = deflate(webhook_event(4, "resumed").to_string().as_bytes());
    assert_eq!(post(&app, WEBHOOK_ROUTE, body).await.0, StatusCode::OK);
    assert_eq!(handler.sequences(), vec![Some(4)]);

    source.stop().await;
}
