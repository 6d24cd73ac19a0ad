//! Wire codec
//!
//! Turns raw socket/webhook bytes into [`Frame`]s. Decode failures are per-message:
//! callers log and drop them without touching the connection.

use super::{Frame, Signal};
use flate2::read::DeflateDecoder;
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use thiserror::Error;

/// Wire decode errors
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Raw DEFLATE stream could not be inflated
    #[error("Inflate failed: {0}")]
    Inflate(#[source] std::io::Error),

    /// Bytes are not a valid JSON frame
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required frame field is absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct WireFrame {
    #[serde(default)]
    s: Option<Signal>,
    #[serde(default)]
    sn: Option<u64>,
    #[serde(default)]
    d: Option<Value>,
}

/// Inflate a raw DEFLATE stream (no zlib header)
pub fn inflate(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = DeflateDecoder::new(raw);
    let mut out = Vec::with_capacity(raw.len() * 4);
    decoder.read_to_end(&mut out).map_err(DecodeError::Inflate)?;
    Ok(out)
}

/// Decode one wire message
pub fn decode(raw: &[u8], is_compressed: bool) -> Result<Frame, DecodeError> {
    if is_compressed {
        let inflated = inflate(raw)?;
        return parse(&inflated);
    }
    parse(raw)
}

/// Parse an uncompressed JSON frame
pub fn parse(json: &[u8]) -> Result<Frame, DecodeError> {
    let wire: WireFrame = serde_json::from_slice(json)?;
    let signal = wire.s.ok_or(DecodeError::MissingField("s"))?;

    let payload = match wire.d {
        Some(d) => d,
        None if signal.allows_empty_payload() => Value::Null,
        None => return Err(DecodeError::MissingField("d")),
    };

    Ok(Frame::new(signal, wire.sn, payload))
}
