//! Heartbeat loop
//!
//! Pings the gateway with the current sequence number and watches for PONGs.
//! A missed PONG puts the connection in TIMEOUT; if the follow-up pings also go
//! unanswered, the loop requests a reconnect and exits.

use super::Connector;
use crate::error::GatewayError;
use crate::protocol::Frame;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

impl Connector {
    pub(super) async fn run_heartbeat(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let interval = self.config.heartbeat_interval;

        loop {
            tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break,
                () = tokio::time::sleep(interval) => {}
            }

            if !self.is_connected() {
                continue;
            }

            if self.ping_within(self.config.pong_timeout).await {
                self.strategy().maybe_reset_after_stable();
                continue;
            }
            if *stop.borrow() {
                break;
            }

            self.set_timeout(true);

            let mut recovered = false;
            for window in &self.config.follow_up_windows {
                if self.ping_within(*window).await {
                    recovered = true;
                    break;
                }
                if *stop.borrow() {
                    return;
                }
            }

            if !recovered {
                tracing::warn!("PING failed. Attempting to reconnect");
                self.fail_connection(GatewayError::HeartbeatTimeout);
                break;
            }
        }
        tracing::debug!("Heartbeat loop ended");
    }

    /// Send a ping and wait up to `window` for its PONG
    async fn ping_within(&self, window: Duration) -> bool {
        self.ping_ok.store(false, Ordering::SeqCst);

        let sequence = self.ctx.session.sequence();
        let sent = match Frame::ping(sequence).to_json() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::error!(error = %e, "Unable to encode PING");
                false
            }
        };
        if sent {
            tracing::trace!(sequence, "PING sent");
        } else {
            tracing::warn!("Unable to queue PING");
        }

        // Register before checking the flag so an early PONG is not missed
        let wait = async {
            loop {
                let notified = self.pong_notify.notified();
                if self.is_ping_ok() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(window, wait).await.is_ok()
    }
}
