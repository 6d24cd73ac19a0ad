//! Gateway frame format
//!
//! One decoded unit of the wire protocol: `{"s": <signal>, "sn": <seq?>, "d": <payload>}`.

use super::{HelloPayload, ReconnectPayload, ResumeAckPayload, Signal};
use serde::Serialize;
use serde_json::Value;

/// A decoded wire frame
///
/// Immutable once built. The payload is opaque at this layer; typed accessors
/// exist only for the control frames the transports consume themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    /// Signal type
    #[serde(rename = "s")]
    signal: Signal,

    /// Stream position (data frames only)
    #[serde(rename = "sn", skip_serializing_if = "Option::is_none")]
    sequence: Option<u64>,

    /// Payload
    #[serde(rename = "d", skip_serializing_if = "Value::is_null")]
    payload: Value,
}

impl Frame {
    /// Build a frame from its parts
    #[must_use]
    pub fn new(signal: Signal, sequence: Option<u64>, payload: Value) -> Self {
        Self {
            signal,
            sequence,
            payload,
        }
    }

    /// Create an Event frame (s=0)
    #[must_use]
    pub fn event(sequence: u64, payload: Value) -> Self {
        Self::new(Signal::Event, Some(sequence), payload)
    }

    /// Create a heartbeat PING (s=2) carrying the current sequence number
    #[must_use]
    pub fn ping(sequence: u64) -> Self {
        Self::new(Signal::Ping, Some(sequence), Value::Null)
    }

    /// Create a PONG (s=3)
    #[must_use]
    pub fn pong() -> Self {
        Self::new(Signal::Pong, None, Value::Null)
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    // === Control payloads ===

    /// Try to parse as a Hello payload (s=1)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        self.typed_payload(Signal::Hello)
    }

    /// Try to parse as a Reconnect payload (s=5)
    pub fn as_reconnect(&self) -> Option<ReconnectPayload> {
        self.typed_payload(Signal::Reconnect)
    }

    /// Try to parse as a Resume ACK payload (s=6)
    pub fn as_resume_ack(&self) -> Option<ResumeAckPayload> {
        self.typed_payload(Signal::ResumeAck)
    }

    fn typed_payload<T: serde::de::DeserializeOwned>(&self, expected: Signal) -> Option<T> {
        if self.signal != expected {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// Look up a string field of the payload
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sequence {
            Some(sn) => write!(f, "Frame(s={}, sn={sn})", self.signal),
            None => write!(f, "Frame(s={})", self.signal),
        }
    }
}
