//! Webhook HTTP server
//!
//! Provides the router for the configured callback route and the serve loop.

use super::handler::{webhook_handler, WebhookState};
use crate::client::ClientContext;
use crate::error::{GatewayError, GatewayResult};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the webhook application for `route`
pub fn create_app(route: &str, state: WebhookState) -> Router {
    Router::new()
        .route(route, post(webhook_handler))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `listener` until the client shuts down
pub async fn serve(listener: TcpListener, app: Router, ctx: ClientContext) -> GatewayResult<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { ctx.wait_for_shutdown().await })
        .await
        .map_err(GatewayError::Io)?;

    tracing::info!("Webhook server stopped");
    Ok(())
}
