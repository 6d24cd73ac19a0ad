//! Inbound webhook transport
//!
//! The platform pushes frames as HTTP POSTs. Each request is inflated,
//! decrypted and verified before its frame reaches the shared dispatcher.

mod crypto;
mod handler;
mod server;

pub use crypto::{decrypt, encrypt, CryptoError};
pub use handler::{
    process_request, webhook_handler, WebhookError, WebhookOutcome, WebhookSettings, WebhookState,
};
pub use server::{create_app, serve};
