//! Connector Integration Tests
//!
//! Drive the socket transport end to end over the fake gateway API and the
//! scripted dialer. Time is paused so heartbeat and backoff windows elapse
//! instantly.
//!
//! Run with: cargo test -p integration-tests --test connector_tests

use integration_tests::{
    connector_config, event_json, settle, test_config, test_context, Dial, FakeDialer,
    FakeGatewayApi, RecordingHandler, ServerScript,
};
use kook_common::TransportMode;
use kook_gateway::{
    ClientContext, ConnectionState, Connector, FrameSource, GatewayError, SocketFrameSource,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

type Harness = (
    Arc<Connector>,
    ClientContext,
    Arc<FakeGatewayApi>,
    Arc<RecordingHandler>,
);

fn connector(dialer: Arc<FakeDialer>) -> Harness {
    let dir = std::env::temp_dir();
    let (ctx, api, handler) = test_context(test_config(TransportMode::WebSocket, &dir));
    let connector = Connector::new(ctx.clone(), dialer, connector_config());
    (connector, ctx, api, handler)
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_heartbeat_keeps_connection() {
    let dialer = FakeDialer::accepting();
    let (connector, ctx, api, _) = connector(dialer.clone());

    connector.start().await.unwrap();
    assert_eq!(connector.state(), ConnectionState::Connected);
    assert_eq!(ctx.session.id().as_deref(), Some("session-1"));

    // First PING goes out at 30s and is answered straight away
    settle(Duration::from_secs(31)).await;

    assert_eq!(dialer.pings(), vec![0]);
    assert_eq!(connector.state(), ConnectionState::Connected);
    assert!(connector.is_connected());
    assert!(!connector.is_timed_out());
    assert_eq!(connector.strategy().attempt_count(), 0);
    assert_eq!(dialer.dial_count(), 1);
    assert_eq!(api.resolve_count(), 1);

    connector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_opens_reresolve_gateway() {
    let dialer = FakeDialer::new([Dial::Fail, Dial::Fail]);
    let (connector, _, api, _) = connector(dialer.clone());

    connector.start().await.unwrap();

    assert!(connector.is_connected());
    assert_eq!(dialer.dial_count(), 3);
    assert_eq!(api.resolve_count(), 2);

    let urls = dialer.urls();
    assert_eq!(urls[0], urls[1]);
    assert_ne!(urls[1], urls[2]);

    let strategy = connector.strategy();
    assert_eq!(strategy.failure_count(), 2);
    assert_eq!(strategy.success_count(), 1);
    drop(strategy);

    connector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_hello_times_out_and_retries_same_url() {
    let dialer = FakeDialer::new([Dial::Silent]);
    let (connector, _, api, _) = connector(dialer.clone());

    let started = tokio::time::Instant::now();
    connector.start().await.unwrap();

    // The second open on the same URL happens once the 15s window runs out
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
    assert!(connector.is_connected());
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(api.resolve_count(), 1);

    let urls = dialer.urls();
    assert_eq!(urls[0], urls[1]);

    let strategy = connector.strategy();
    assert_eq!(strategy.failure_count(), 1);
    assert!(strategy.last_error().is_some_and(|e| e.contains("timed out")));
    drop(strategy);

    connector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_online_cleared_before_open() {
    let dialer = FakeDialer::accepting();
    let (connector, _, api, _) = connector(dialer);
    api.online.store(true, std::sync::atomic::Ordering::SeqCst);

    connector.start().await.unwrap();
    assert_eq!(api.offline_count(), 1);

    connector.shutdown().await;
    assert_eq!(api.offline_count(), 2);
}

// ============================================================================
// Unrecoverable failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unauthorized_resolve_halts() {
    let dir = std::env::temp_dir();
    let api = FakeGatewayApi::failing_with(401);
    let ctx = ClientContext::new(
        test_config(TransportMode::WebSocket, &dir),
        api.clone(),
        RecordingHandler::new(),
    );
    let dialer = FakeDialer::accepting();
    let connector = Connector::new(ctx, dialer.clone(), connector_config());

    let err = connector.start().await.unwrap_err();
    assert!(matches!(err, GatewayError::Http { status: 401, .. }));
    assert!(connector.strategy().is_halted());
    assert_eq!(api.resolve_count(), 1);
    assert_eq!(dialer.dial_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_token_hello_halts() {
    let dialer = FakeDialer::new([Dial::Accept(ServerScript::rejecting(40101))]);
    let (connector, _, _, _) = connector(dialer.clone());

    let err = connector.start().await.unwrap_err();
    assert!(matches!(err, GatewayError::HandshakeRejected(40101)));
    assert!(connector.strategy().is_halted());
    assert!(!connector.is_connected());
    assert_eq!(dialer.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_hello_codes_retry() {
    let dialer = FakeDialer::new([Dial::Accept(ServerScript::rejecting(40103))]);
    let (connector, _, _, _) = connector(dialer.clone());

    connector.start().await.unwrap();
    assert!(connector.is_connected());
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(connector.strategy().failure_count(), 1);

    connector.shutdown().await;
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_recovers_without_reconnect() {
    let dialer = FakeDialer::new([Dial::Accept(ServerScript::ignoring_pings(2))]);
    let (connector, _, _, _) = connector(dialer.clone());

    connector.start().await.unwrap();

    // PING at 30s misses its 6s window, the first follow-up misses its 2s window
    settle(Duration::from_secs(37)).await;
    assert!(connector.is_timed_out());
    assert!(connector.is_connected());

    // The second follow-up at 38s is answered
    settle(Duration::from_secs(3)).await;
    assert_eq!(dialer.pings().len(), 3);
    assert!(!connector.is_timed_out());
    assert!(connector.is_connected());
    assert!(!connector.is_reconnect_required());
    assert_eq!(dialer.dial_count(), 1);

    connector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_failure_reconnects() {
    let dialer = FakeDialer::new([Dial::Accept(ServerScript::ignoring_pings(3))]);
    let (connector, ctx, api, handler) = connector(dialer.clone());

    connector.start().await.unwrap();
    dialer.push(event_json(1, &json!({"content": "before"}))).await;
    settle(Duration::from_millis(10)).await;
    assert_eq!(ctx.session.sequence(), 1);

    // Ping at 30s, follow-ups at 36s and 38s, failure declared at 42s,
    // then one second of backoff before the new socket opens
    settle(Duration::from_secs(45)).await;

    assert_eq!(dialer.pings().len(), 3);
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(api.resolve_count(), 2);
    assert!(connector.is_connected());
    assert!(!connector.is_timed_out());
    assert!(!connector.is_reconnect_required());
    assert_eq!(ctx.session.sequence(), 0);

    let strategy = connector.strategy();
    assert_eq!(strategy.failure_count(), 1);
    assert_eq!(strategy.success_count(), 1);
    assert_eq!(strategy.attempt_count(), 1);
    drop(strategy);

    // Numbering restarts on the new socket
    dialer.push(event_json(1, &json!({"content": "after"}))).await;
    settle(Duration::from_millis(10)).await;
    assert_eq!(handler.sequences(), vec![Some(1), Some(1)]);

    connector.shutdown().await;
}

// ============================================================================
// Frames
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_events_delivered_in_order() {
    let dialer = FakeDialer::accepting();
    let (connector, ctx, _, handler) = connector(dialer.clone());
    connector.start().await.unwrap();

    for sn in [2, 3, 1, 1, 4] {
        dialer.push(event_json(sn, &json!({"n": sn}))).await;
    }
    dialer.push("{not json").await;
    dialer.push(json!({"s": 0, "d": {"unsequenced": true}}).to_string()).await;
    settle(Duration::from_millis(10)).await;

    assert_eq!(
        handler.sequences(),
        vec![Some(1), Some(2), Some(3), Some(4), None]
    );
    assert_eq!(ctx.session.sequence(), 4);
    assert_eq!(ctx.session.buffered_len(), 0);
    assert!(connector.is_connected());

    connector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_server_reconnect_signal() {
    let dialer = FakeDialer::accepting();
    let (connector, ctx, _, _) = connector(dialer.clone());
    connector.start().await.unwrap();

    dialer
        .push(json!({"s": 5, "d": {"code": 41008, "err": "Missing params"}}).to_string())
        .await;
    settle(Duration::from_secs(2)).await;

    assert_eq!(dialer.dial_count(), 2);
    assert!(connector.is_connected());

    dialer
        .push(json!({"s": 6, "d": {"session_id": "resumed"}}).to_string())
        .await;
    settle(Duration::from_millis(10)).await;
    assert_eq!(ctx.session.id().as_deref(), Some("resumed"));

    connector.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_server_close_reconnects() {
    let dialer = FakeDialer::accepting();
    let (connector, _, _, _) = connector(dialer.clone());
    connector.start().await.unwrap();

    dialer.drop_connection().await;
    settle(Duration::from_secs(2)).await;

    assert_eq!(dialer.dial_count(), 2);
    assert!(connector.is_connected());
    assert_eq!(connector.strategy().failure_count(), 1);

    connector.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_idempotent() {
    let dialer = FakeDialer::accepting();
    let (connector, ctx, api, _) = connector(dialer.clone());
    connector.start().await.unwrap();

    connector.shutdown().await;
    connector.shutdown().await;

    assert!(ctx.is_shutting_down());
    assert!(!connector.is_connected());
    assert_eq!(connector.state(), ConnectionState::Disconnected);
    assert_eq!(api.offline_count(), 1);

    // No reconnect happens after shutdown
    connector.request_reconnect();
    settle(Duration::from_secs(120)).await;
    assert_eq!(dialer.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_socket_frame_source() {
    let dir = std::env::temp_dir();
    let (ctx, _, _) = test_context(test_config(TransportMode::WebSocket, &dir));
    let dialer = FakeDialer::accepting();
    let source = SocketFrameSource::new(ctx, dialer, connector_config());

    assert!(!source.is_connected());
    source.start().await.unwrap();
    assert!(source.is_connected());
    assert!(source.connector().has_connected_once());

    source.stop().await;
    assert!(!source.is_connected());
}
