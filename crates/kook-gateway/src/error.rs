//! Gateway error types

use crate::protocol::HelloCode;
use std::time::Duration;
use thiserror::Error;

/// Markers that identify authentication/authorization failures in error text
const UNRECOVERABLE_MARKERS: [&str; 5] = ["401", "Unauthorized", "Invalid token", "403", "Forbidden"];

/// Transport and REST errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Gateway URL could not be resolved
    #[error("Gateway resolve failed: {0}")]
    Resolve(String),

    /// REST call returned a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// REST call returned a non-zero envelope code
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    /// Socket could not be opened or failed mid-stream
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// No successful HELLO within the open timeout
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// HELLO arrived with a non-zero code
    #[error("Handshake rejected with code {0}")]
    HandshakeRejected(i64),

    /// No PONG arrived for the heartbeat and its follow-ups
    #[error("Heartbeat timed out")]
    HeartbeatTimeout,

    /// The server sent a RECONNECT frame
    #[error("Server requested reconnect (code {code:?})")]
    ReconnectRequested { code: Option<i64> },

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket closed
    #[error("Connection closed")]
    Closed,

    /// The client is shutting down
    #[error("Shutting down")]
    ShuttingDown,
}

impl GatewayError {
    /// Check if this error is an authentication/authorization failure
    ///
    /// Such failures never heal on retry; the operator has to fix the token.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 401 | 403),
            Self::Api { code, .. } if matches!(code, 401 | 403) => true,
            Self::HandshakeRejected(code) => {
                HelloCode::from_i64(*code).is_some_and(|c| !c.should_reconnect())
            }
            Self::ShuttingDown
            | Self::Closed
            | Self::HandshakeTimeout(_)
            | Self::HeartbeatTimeout
            | Self::ReconnectRequested { .. }
            | Self::Io(_) => false,
            other => {
                let text = other.to_string();
                UNRECOVERABLE_MARKERS.iter().any(|m| text.contains(m))
            }
        }
    }

    /// Create a WebSocket error
    #[must_use]
    pub fn websocket(msg: impl std::fmt::Display) -> Self {
        Self::WebSocket(msg.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => Self::Resolve(err.to_string()),
        }
    }
}

impl From<GatewayError> for kook_common::AppError {
    fn from(err: GatewayError) -> Self {
        Self::gateway(err)
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
