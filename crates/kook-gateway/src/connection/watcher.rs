//! Reconnect watcher
//!
//! A single task parked until `request_reconnect` wakes it. It restarts the
//! connection and clears the reconnect flag, for the whole client lifetime.

use super::Connector;
use crate::error::GatewayError;
use std::sync::atomic::Ordering;
use std::sync::Arc;

impl Connector {
    /// Spawn the watcher once; later calls are no-ops
    pub(super) fn spawn_watcher(self: &Arc<Self>) {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return;
        }
        let connector = self.clone();
        *watcher = Some(tokio::spawn(connector.watch_reconnects()));
    }

    async fn watch_reconnects(self: Arc<Self>) {
        let mut shutdown = self.ctx.shutdown_signal();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                () = self.reconnect_notify.notified() => {}
            }

            if !(self.is_reconnect_required() && !self.is_connected()) {
                tracing::debug!("Reconnect wakeup with nothing to do");
                continue;
            }

            match self.restart().await {
                Ok(()) => tracing::info!("Reconnected to gateway"),
                Err(GatewayError::ShuttingDown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Reconnecting abandoned, stopping client");
                    self.ctx.trigger_shutdown();
                    break;
                }
            }
            self.require_reconnect.store(false, Ordering::SeqCst);

            // The new connection may have failed while the flag was still set
            if self.is_running() && !self.is_connected() {
                self.request_reconnect();
            }
        }
        tracing::debug!("Reconnect watcher stopped");
    }
}
