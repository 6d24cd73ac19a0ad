//! Client handle
//!
//! Everything the transports share, passed explicitly instead of through globals.

use crate::api::GatewayApi;
use crate::dispatch::{Dispatcher, FrameHandler};
use crate::session::Session;
use kook_common::AppConfig;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared client state
///
/// Cheap to clone; every field is reference counted.
#[derive(Clone)]
pub struct ClientContext {
    pub config: Arc<AppConfig>,
    pub session: Arc<Session>,
    pub dispatcher: Arc<Dispatcher>,
    pub api: Arc<dyn GatewayApi>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ClientContext {
    pub fn new(config: AppConfig, api: Arc<dyn GatewayApi>, handler: Arc<dyn FrameHandler>) -> Self {
        let session = Arc::new(Session::new());
        let dispatcher = Arc::new(Dispatcher::new(session.clone(), handler));
        let (shutdown, _) = watch::channel(false);

        Self {
            config: Arc::new(config),
            session,
            dispatcher,
            api,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Receiver that flips to true once shutdown starts
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Begin shutdown; safe to call more than once
    pub fn trigger_shutdown(&self) {
        let first = !self.shutdown.send_replace(true);
        if first {
            tracing::info!("Client shutdown triggered");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown starts
    pub async fn wait_for_shutdown(&self) {
        let mut signal = self.shutdown_signal();
        let _ = signal.wait_for(|stop| *stop).await;
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("mode", &self.config.mode)
            .field("session", &self.session)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
