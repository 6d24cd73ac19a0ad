//! Webhook request handling
//!
//! The per-request pipeline is a pure function of the settings and the raw
//! body: inflate, decrypt, parse, verify, then either answer the challenge or
//! hand back an event frame. Nothing touches the session until a frame has
//! passed every step.

use super::crypto::{self, CryptoError};
use crate::client::ClientContext;
use crate::protocol::{inflate, parse, DecodeError, Frame};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kook_common::{ConfigError, WebhookConfig};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

const CHALLENGE_CHANNEL_TYPE: &str = "WEBHOOK_CHALLENGE";

/// Settings the pipeline needs
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub verify_token: String,
    pub encrypt_key: Option<String>,
    /// Inflate bodies unless the request says `compress=0`
    pub compress: bool,
}

impl WebhookSettings {
    pub fn from_config(config: &WebhookConfig) -> Result<Self, ConfigError> {
        let verify_token = config
            .verify_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingVar("WEBHOOK_VERIFY_TOKEN"))?;

        Ok(Self {
            verify_token,
            encrypt_key: config.encrypt_key.clone().filter(|k| !k.is_empty()),
            compress: config.compress,
        })
    }
}

/// Per-request failures; every one is answered with 400 and an empty body
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Empty request body")]
    EmptyBody,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Body has no encrypt field")]
    MissingEncryptField,

    #[error("Decryption failed: {0}")]
    Decrypt(#[from] CryptoError),

    #[error("Missing verify_token")]
    MissingVerifyToken,

    #[error("verify_token mismatch")]
    VerifyTokenMismatch,

    #[error("Challenge without a challenge value")]
    MissingChallenge,
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}

/// What a verified request turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Endpoint verification handshake; echo the value back
    Challenge(String),
    /// A real frame for the dispatch boundary
    Event(Frame),
}

#[derive(Deserialize)]
struct EncryptedBody {
    encrypt: Option<String>,
}

/// Run the request pipeline
pub fn process_request(
    settings: &WebhookSettings,
    body: &[u8],
    compressed: bool,
) -> Result<WebhookOutcome, WebhookError> {
    if body.is_empty() {
        return Err(WebhookError::EmptyBody);
    }

    let inflated;
    let body = if compressed {
        inflated = inflate(body)?;
        inflated.as_slice()
    } else {
        body
    };

    let decrypted;
    let json = match &settings.encrypt_key {
        Some(key) => {
            let envelope: EncryptedBody =
                serde_json::from_slice(body).map_err(DecodeError::from)?;
            let encrypted = envelope.encrypt.ok_or(WebhookError::MissingEncryptField)?;
            decrypted = crypto::decrypt(&encrypted, key)?;
            decrypted.as_slice()
        }
        None => body,
    };

    let frame = parse(json)?;
    let data = frame.payload();

    let token = data
        .get("verify_token")
        .and_then(Value::as_str)
        .ok_or(WebhookError::MissingVerifyToken)?;
    if token != settings.verify_token {
        return Err(WebhookError::VerifyTokenMismatch);
    }

    if frame.payload_str("channel_type") == Some(CHALLENGE_CHANNEL_TYPE) {
        let challenge = match data.get("challenge") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => return Err(WebhookError::MissingChallenge),
            Some(other) => other.to_string(),
        };
        return Ok(WebhookOutcome::Challenge(challenge));
    }

    Ok(WebhookOutcome::Event(frame))
}

/// Shared state for the webhook route
#[derive(Debug, Clone)]
pub struct WebhookState {
    pub ctx: ClientContext,
    pub settings: Arc<WebhookSettings>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    compress: Option<String>,
}

/// POST handler for the configured route
pub async fn webhook_handler(
    State(state): State<WebhookState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Response {
    let compressed = state.settings.compress && query.compress.as_deref() != Some("0");

    match process_request(&state.settings, &body, compressed) {
        Ok(WebhookOutcome::Challenge(challenge)) => {
            tracing::info!("Answered webhook challenge");
            Json(serde_json::json!({ "challenge": challenge })).into_response()
        }
        Ok(WebhookOutcome::Event(frame)) => {
            tracing::debug!(%frame, "Webhook frame received");
            state.ctx.dispatcher.dispatch(frame);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejected webhook request");
            e.into_response()
        }
    }
}
