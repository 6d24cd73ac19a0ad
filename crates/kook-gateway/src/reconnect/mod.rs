//! Reconnect policy

mod strategy;

pub use strategy::{ReconnectStrategy, BACKOFF_SECONDS, DEFAULT_STABLE_PERIOD, MAX_BACKOFF};
