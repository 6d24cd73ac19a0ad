//! Frame sources
//!
//! The two transports behind one capability. Both feed the dispatcher held by
//! the shared [`ClientContext`].

use crate::client::ClientContext;
use crate::connection::{Connector, ConnectorConfig, SocketDialer, TungsteniteDialer};
use crate::error::GatewayResult;
use crate::session::SequenceStore;
use crate::webhook::{create_app, serve, WebhookSettings, WebhookState};
use async_trait::async_trait;
use axum::Router;
use kook_common::{ConfigError, TransportMode};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Something that produces frames for the dispatcher
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Begin receiving frames
    async fn start(&self) -> GatewayResult<()>;

    /// Stop receiving frames; safe to call more than once
    async fn stop(&self);

    fn is_connected(&self) -> bool;
}

/// Pick the frame source for the configured transport
pub fn frame_source(ctx: &ClientContext) -> Result<Box<dyn FrameSource>, ConfigError> {
    match ctx.config.mode {
        TransportMode::WebSocket => Ok(Box::new(SocketFrameSource::new(
            ctx.clone(),
            Arc::new(TungsteniteDialer),
            ConnectorConfig::default(),
        ))),
        TransportMode::Webhook => Ok(Box::new(WebhookFrameSource::new(ctx.clone())?)),
    }
}

// === Socket ===

/// Outbound socket transport
#[derive(Debug)]
pub struct SocketFrameSource {
    connector: Arc<Connector>,
}

impl SocketFrameSource {
    pub fn new(ctx: ClientContext, dialer: Arc<dyn SocketDialer>, config: ConnectorConfig) -> Self {
        Self {
            connector: Connector::new(ctx, dialer, config),
        }
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }
}

#[async_trait]
impl FrameSource for SocketFrameSource {
    async fn start(&self) -> GatewayResult<()> {
        self.connector.start().await
    }

    async fn stop(&self) {
        self.connector.shutdown().await;
    }

    fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }
}

// === Webhook ===

/// Inbound HTTP transport
#[derive(Debug)]
pub struct WebhookFrameSource {
    ctx: ClientContext,
    settings: Arc<WebhookSettings>,
    route: String,
    address: String,
    store: SequenceStore,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebhookFrameSource {
    pub fn new(ctx: ClientContext) -> Result<Self, ConfigError> {
        let webhook = &ctx.config.webhook;
        let route = webhook
            .route_path()
            .ok_or(ConfigError::MissingVar("WEBHOOK_ROUTE"))?;
        let settings = Arc::new(WebhookSettings::from_config(webhook)?);
        let address = webhook.address();
        let store = SequenceStore::new(webhook.sequence_file.clone());

        Ok(Self {
            ctx,
            settings,
            route,
            address,
            store,
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Address the server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// The router serving the callback route
    pub fn router(&self) -> Router {
        create_app(
            &self.route,
            WebhookState {
                ctx: self.ctx.clone(),
                settings: self.settings.clone(),
            },
        )
    }

    async fn restore_sequence(&self) {
        match self.store.load().await {
            Ok(Some(sequence)) => {
                tracing::info!(sequence, "Restored sequence number");
                self.ctx.session.set_sequence(sequence);
            }
            Ok(None) => tracing::debug!("No persisted sequence number"),
            Err(e) => tracing::warn!(
                path = %self.store.path().display(),
                error = %e,
                "Ignoring unreadable sequence file"
            ),
        }
    }
}

#[async_trait]
impl FrameSource for WebhookFrameSource {
    async fn start(&self) -> GatewayResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.restore_sequence().await;

        let listener = match TcpListener::bind(&self.address).await {
            Ok(listener) => listener,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                tracing::error!(address = %self.address, error = %e, "Unable to bind webhook server");
                return Err(e.into());
            }
        };
        *self.local_addr.lock() = listener.local_addr().ok();

        let writer = self
            .store
            .clone()
            .spawn_writer(self.ctx.session.subscribe(), self.ctx.shutdown_signal());

        let app = self.router();
        let ctx = self.ctx.clone();
        let server = tokio::spawn(async move {
            if let Err(e) = serve(listener, app, ctx.clone()).await {
                tracing::error!(error = %e, "Webhook server failed");
                ctx.trigger_shutdown();
            }
        });

        self.tasks.lock().extend([server, writer]);
        tracing::info!(route = %self.route, "Webhook transport started");
        Ok(())
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.ctx.trigger_shutdown();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Webhook task ended abnormally");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
