//! Control frame payloads
//!
//! Payload structures of the control frames the transports interpret themselves.
//! Event payloads are left opaque.

use serde::{Deserialize, Serialize};

/// Payload for s=1 (Hello)
///
/// Sent by the server right after the socket opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Handshake status, see [`super::HelloCode`]
    pub code: i64,

    /// Session assigned by the gateway (present when `code == 0`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl HelloPayload {
    /// Check whether the handshake succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Payload for s=5 (Reconnect)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconnectPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// Payload for s=6 (Resume ACK)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeAckPayload {
    pub session_id: String,
}
