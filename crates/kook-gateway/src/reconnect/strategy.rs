//! Reconnect policy
//!
//! Backoff selection and failure classification, kept apart from the connector
//! so the policy can be driven directly in tests.

use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff delays in seconds, indexed by attempt number
pub const BACKOFF_SECONDS: [u64; 7] = [1, 2, 4, 8, 16, 32, 60];

/// Delay used once the table is exhausted
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Continuous uptime after which the attempt counter resets
pub const DEFAULT_STABLE_PERIOD: Duration = Duration::from_secs(300);

/// Reconnect backoff and statistics
///
/// Retries are unbounded for recoverable failures. An unrecoverable failure
/// halts the strategy until [`ReconnectStrategy::full_reset`].
#[derive(Debug)]
pub struct ReconnectStrategy {
    attempt_count: u32,
    total_attempts: u64,
    success_count: u64,
    failure_count: u64,
    last_error: Option<String>,
    last_attempt_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    last_success: Option<Instant>,
    connected_since: Option<Instant>,
    halted: bool,
    stable_period: Duration,
}

impl ReconnectStrategy {
    pub fn new() -> Self {
        Self::with_stable_period(DEFAULT_STABLE_PERIOD)
    }

    pub fn with_stable_period(stable_period: Duration) -> Self {
        Self {
            attempt_count: 0,
            total_attempts: 0,
            success_count: 0,
            failure_count: 0,
            last_error: None,
            last_attempt_time: None,
            last_success_time: None,
            last_success: None,
            connected_since: None,
            halted: false,
            stable_period,
        }
    }

    /// Classify a failure
    ///
    /// Returns false, permanently, for authentication/authorization failures.
    /// Every other failure is counted and allowed to retry.
    pub fn should_reconnect(&mut self, err: &GatewayError) -> bool {
        self.last_error = Some(err.to_string());
        self.last_attempt_time = Some(Utc::now());

        if self.halted {
            return false;
        }

        if err.is_unrecoverable() {
            self.halted = true;
            tracing::error!(
                error = %err,
                "Unrecoverable gateway failure, reconnecting stopped; check the bot token"
            );
            tracing::error!("{}", self.statistics_report());
            return false;
        }

        self.failure_count += 1;
        self.connected_since = None;
        tracing::warn!(error = %err, failures = self.failure_count, "Recoverable gateway failure");
        true
    }

    /// Next backoff delay; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let attempt = self.attempt_count as usize;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.total_attempts += 1;

        let delay = BACKOFF_SECONDS
            .get(attempt)
            .map_or(MAX_BACKOFF, |secs| Duration::from_secs(*secs));
        tracing::info!(
            delay_secs = delay.as_secs(),
            attempt = attempt + 1,
            "Scheduling reconnect"
        );
        delay
    }

    /// Record a successful connection
    pub fn on_connection_success(&mut self) {
        self.on_connection_success_at(Instant::now());
    }

    pub fn on_connection_success_at(&mut self, now: Instant) {
        if let Some(previous) = self.last_success {
            let stable = now.saturating_duration_since(previous);
            if stable >= self.stable_period {
                tracing::info!(
                    stable_secs = stable.as_secs(),
                    "Previous connection was stable, resetting attempt counter"
                );
                self.reset();
            }
        }

        if self.attempt_count > 0 {
            self.success_count += 1;
            tracing::info!(attempts = self.attempt_count, "Reconnected");
        }

        self.last_success = Some(now);
        self.last_success_time = Some(Utc::now());
        self.connected_since = Some(now);
    }

    /// Record that the current connection went away
    pub fn on_disconnect(&mut self) {
        self.connected_since = None;
    }

    /// Reset the attempt counter once the connection has stayed up long enough
    ///
    /// Returns true when a reset happened.
    pub fn maybe_reset_after_stable(&mut self) -> bool {
        self.maybe_reset_after_stable_at(Instant::now())
    }

    pub fn maybe_reset_after_stable_at(&mut self, now: Instant) -> bool {
        let stable = self
            .connected_since
            .is_some_and(|since| now.saturating_duration_since(since) >= self.stable_period);
        if stable && self.attempt_count > 0 {
            tracing::info!(attempts = self.attempt_count, "Connection stable, resetting attempt counter");
            self.reset();
            return true;
        }
        false
    }

    /// Clear the attempt counter and last error
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.last_error = None;
    }

    /// Clear everything, including statistics and a halt
    pub fn full_reset(&mut self) {
        *self = Self::with_stable_period(self.stable_period);
    }

    // === Statistics ===

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_attempt_time(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_time
    }

    pub fn last_success_time(&self) -> Option<DateTime<Utc>> {
        self.last_success_time
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Successful reconnects per scheduled attempt, in `0.0..=1.0`
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_attempts as f64
    }

    /// Multi-line report for the log
    pub fn statistics_report(&self) -> String {
        fn or_na(time: Option<DateTime<Utc>>) -> String {
            time.map_or_else(|| "N/A".to_string(), |t| t.to_rfc3339())
        }

        format!(
            "Reconnect statistics:\n\
             current attempt: {}\n\
             total attempts: {}\n\
             successful reconnects: {}\n\
             failures: {}\n\
             success rate: {:.2}%\n\
             last success: {}\n\
             last attempt: {}\n\
             last error: {}",
            self.attempt_count,
            self.total_attempts,
            self.success_count,
            self.failure_count,
            self.success_rate() * 100.0,
            or_na(self.last_success_time),
            or_na(self.last_attempt_time),
            self.last_error.as_deref().unwrap_or("N/A"),
        )
    }
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReconnectStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReconnectStrategy[attempt={}, success={:.2}%]",
            self.attempt_count,
            self.success_rate() * 100.0
        )
    }
}
