//! Socket connector
//!
//! Owns the outbound gateway socket: resolves the gateway URL, opens the
//! socket and waits for HELLO, routes received frames, and rebuilds the
//! connection when the heartbeat or the transport reports a failure.

use super::socket::{InboundMessage, OutboundMessage, SocketDialer, SocketLink};
use super::state::{ConnectionState, ConnectorConfig};
use crate::client::ClientContext;
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{decode, Frame, Signal};
use crate::reconnect::ReconnectStrategy;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

/// The socket currently in use
struct ActiveLink {
    outgoing: mpsc::Sender<OutboundMessage>,
    /// Stops the read loop and heartbeat bound to this socket
    stop: watch::Sender<bool>,
}

/// Outbound socket transport
pub struct Connector {
    pub(super) ctx: ClientContext,
    pub(super) config: ConnectorConfig,
    dialer: Arc<dyn SocketDialer>,
    strategy: Mutex<ReconnectStrategy>,
    state: RwLock<ConnectionState>,

    connected: AtomicBool,
    timeout: AtomicBool,
    pub(super) ping_ok: AtomicBool,
    pub(super) require_reconnect: AtomicBool,
    first_connected: AtomicBool,
    shut_down: AtomicBool,

    /// Serialises reconnect requests
    reconnect_lock: Mutex<()>,
    /// Wakes the reconnect watcher
    pub(super) reconnect_notify: Notify,
    /// Wakes heartbeat waiters on PONG
    pub(super) pong_notify: Notify,
    /// Only one restart sequence runs at a time
    restart_guard: tokio::sync::Mutex<()>,

    link: Mutex<Option<ActiveLink>>,
    /// Cause recorded by the failure that requested the pending reconnect
    pending_cause: Mutex<Option<GatewayError>>,
    pub(super) watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Connector {
    pub fn new(ctx: ClientContext, dialer: Arc<dyn SocketDialer>, config: ConnectorConfig) -> Arc<Self> {
        let strategy = ReconnectStrategy::with_stable_period(config.stable_period);
        Arc::new(Self {
            ctx,
            config,
            dialer,
            strategy: Mutex::new(strategy),
            state: RwLock::new(ConnectionState::Disconnected),
            connected: AtomicBool::new(false),
            timeout: AtomicBool::new(false),
            ping_ok: AtomicBool::new(false),
            require_reconnect: AtomicBool::new(false),
            first_connected: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            reconnect_lock: Mutex::new(()),
            reconnect_notify: Notify::new(),
            pong_notify: Notify::new(),
            restart_guard: tokio::sync::Mutex::new(()),
            link: Mutex::new(None),
            pending_cause: Mutex::new(None),
            watcher: Mutex::new(None),
        })
    }

    // === Status ===

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether the heartbeat is currently in TIMEOUT
    pub fn is_timed_out(&self) -> bool {
        self.timeout.load(Ordering::SeqCst)
    }

    pub fn is_ping_ok(&self) -> bool {
        self.ping_ok.load(Ordering::SeqCst)
    }

    pub fn is_reconnect_required(&self) -> bool {
        self.require_reconnect.load(Ordering::SeqCst)
    }

    pub fn has_connected_once(&self) -> bool {
        self.first_connected.load(Ordering::SeqCst)
    }

    /// Reconnect policy and statistics
    ///
    /// Do not hold the guard across an await.
    pub fn strategy(&self) -> MutexGuard<'_, ReconnectStrategy> {
        self.strategy.lock()
    }

    pub(super) fn is_running(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst) && !self.ctx.is_shutting_down()
    }

    fn ensure_running(&self) -> GatewayResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(GatewayError::ShuttingDown)
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    pub(super) fn set_timeout(&self, timeout: bool) {
        let previous = self.timeout.swap(timeout, Ordering::SeqCst);
        if timeout && !previous {
            tracing::warn!("PING failed. Status is now TIMEOUT");
        } else if !timeout && previous {
            tracing::info!("Heartbeat recovered from TIMEOUT");
        }
    }

    // === Lifecycle ===

    /// Connect for the first time
    ///
    /// Retries with backoff until connected. Only an unrecoverable failure or
    /// shutdown makes it return an error.
    pub async fn start(self: &Arc<Self>) -> GatewayResult<()> {
        self.spawn_watcher();

        loop {
            match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(GatewayError::ShuttingDown) => return Err(GatewayError::ShuttingDown),
                Err(e) => {
                    if !self.strategy.lock().should_reconnect(&e) {
                        return Err(e);
                    }
                    let delay = self.strategy.lock().next_delay();
                    self.sleep_or_shutdown(delay).await?;
                }
            }
        }
    }

    /// Tear down the socket and connect again
    ///
    /// Runs iteratively until connected, stopped only by the reconnect policy
    /// or shutdown.
    pub async fn restart(self: &Arc<Self>) -> GatewayResult<()> {
        let _guard = self.restart_guard.lock().await;
        self.ensure_running()?;

        tracing::info!("Restarting gateway connection");
        self.close_socket();
        self.connected.store(false, Ordering::SeqCst);
        self.set_timeout(false);
        self.set_state(ConnectionState::Disconnected);
        self.ctx.session.reset();

        let mut cause = self
            .pending_cause
            .lock()
            .take()
            .unwrap_or(GatewayError::Closed);

        loop {
            if !self.strategy.lock().should_reconnect(&cause) {
                return Err(cause);
            }
            let delay = self.strategy.lock().next_delay();
            tracing::info!(delay_secs = delay.as_secs(), "Reconnecting after delay");
            self.sleep_or_shutdown(delay).await?;

            match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(GatewayError::ShuttingDown) => return Err(GatewayError::ShuttingDown),
                Err(e) => {
                    tracing::error!(error = %e, "Reconnect attempt failed");
                    cause = e;
                }
            }
        }
    }

    /// Go offline and close the socket
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down gateway connector");
        self.ctx.trigger_shutdown();
        self.set_timeout(false);

        if let Err(e) = self.ctx.api.notify_offline().await {
            tracing::warn!(error = %e, "Offline notification failed");
        }

        self.close_socket();
        self.connected.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);

        let watcher = self.watcher.lock().take();
        if let Some(handle) = watcher {
            handle.abort();
        }
    }

    /// Ask the watcher for a reconnect
    ///
    /// Idempotent while a reconnect is pending.
    pub fn request_reconnect(&self) {
        if self.require_reconnect.load(Ordering::SeqCst) {
            return;
        }
        let _lock = self.reconnect_lock.lock();
        if self.require_reconnect.load(Ordering::SeqCst) {
            return;
        }
        self.require_reconnect.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        self.strategy.lock().on_disconnect();
        tracing::info!("Reconnect requested");
        self.reconnect_notify.notify_one();
    }

    /// Record why the connection is lost and request a reconnect
    pub(super) fn fail_connection(&self, cause: GatewayError) {
        if !self.is_running() {
            return;
        }
        tracing::warn!(error = %cause, "Gateway connection lost");
        self.pending_cause.lock().get_or_insert(cause);
        self.connected.store(false, Ordering::SeqCst);
        self.request_reconnect();
    }

    /// Handle a PONG
    pub fn pong(&self) {
        tracing::trace!("Got PONG");
        self.ping_ok.store(true, Ordering::SeqCst);
        self.set_timeout(false);
        self.pong_notify.notify_waiters();
    }

    // === Connecting ===

    /// Resolve the gateway and open the socket
    ///
    /// Each resolved URL gets up to `opens_per_gateway` open attempts; every failed
    /// attempt is reported to the reconnect policy. When all attempts fail, the
    /// gateway is resolved again after a backoff delay.
    async fn connect_once(self: &Arc<Self>) -> GatewayResult<()> {
        let mut url = self.resolve_gateway().await?;

        loop {
            self.clear_stale_online().await;

            for attempt in 1..=self.config.opens_per_gateway {
                self.ensure_running()?;
                match self.open(&url).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Socket open failed");
                        if !self.strategy.lock().should_reconnect(&e) {
                            return Err(e);
                        }
                    }
                }
            }

            let delay = self.strategy.lock().next_delay();
            self.sleep_or_shutdown(delay).await?;
            url = self.resolve_gateway().await?;
        }
    }

    async fn resolve_gateway(&self) -> GatewayResult<String> {
        self.ensure_running()?;
        let url = self
            .ctx
            .api
            .gateway_url(self.ctx.config.gateway.compress)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Gateway resolve failed"))?;
        tracing::debug!(%url, "Gateway resolved");
        Ok(url)
    }

    /// Post offline first if the platform still lists the bot as online
    async fn clear_stale_online(&self) {
        match self.ctx.api.is_online().await {
            Ok(true) => {
                tracing::info!("Bot still marked online, going offline before connecting");
                if let Err(e) = self.ctx.api.notify_offline().await {
                    tracing::warn!(error = %e, "Offline notification failed");
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Online status check failed, connecting anyway"),
        }
    }

    /// One open attempt: dial, then wait for a successful HELLO
    async fn open(self: &Arc<Self>, url: &str) -> GatewayResult<()> {
        self.set_state(ConnectionState::Connecting);
        let window = self.config.open_timeout;

        let link = match tokio::time::timeout(window, self.handshake(url)).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(GatewayError::HandshakeTimeout(window));
            }
        };

        self.on_open(link);
        Ok(())
    }

    async fn handshake(self: &Arc<Self>, url: &str) -> GatewayResult<SocketLink> {
        let mut link = self.dialer.dial(url).await?;

        loop {
            let frame = match link.incoming.recv().await {
                Some(message) => match self.decode_message(message)? {
                    Some(frame) => frame,
                    None => continue,
                },
                None => return Err(GatewayError::Closed),
            };

            if frame.signal() != Signal::Hello {
                self.handle_frame(frame);
                continue;
            }

            let hello = frame
                .as_hello()
                .ok_or_else(|| GatewayError::websocket("malformed HELLO payload"))?;
            if !hello.is_success() {
                tracing::warn!(code = hello.code, "HELLO rejected");
                return Err(GatewayError::HandshakeRejected(hello.code));
            }
            if let Some(id) = hello.session_id {
                self.ctx.session.set_id(id);
            }
            return Ok(link);
        }
    }

    /// Install a freshly opened socket and start its loops
    fn on_open(self: &Arc<Self>, link: SocketLink) {
        self.close_socket();

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.link.lock() = Some(ActiveLink {
            outgoing: link.outgoing,
            stop: stop_tx,
        });

        self.timeout.store(false, Ordering::SeqCst);
        self.ping_ok.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        self.first_connected.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        self.strategy.lock().on_connection_success();

        tokio::spawn(self.clone().read_loop(link.incoming, stop_rx.clone()));
        tokio::spawn(self.clone().run_heartbeat(stop_rx));

        tracing::info!(session_id = ?self.ctx.session.id(), "Gateway connected");
    }

    /// Close the current socket, if any, and stop its loops
    fn close_socket(&self) {
        let active = self.link.lock().take();
        if let Some(active) = active {
            active.stop.send_replace(true);
            if active.outgoing.try_send(OutboundMessage::Close).is_err() {
                tracing::debug!("Socket already gone");
            }
        }
    }

    /// Queue a text message on the current socket
    pub(super) fn send_text(&self, text: String) -> bool {
        let outgoing = self.link.lock().as_ref().map(|l| l.outgoing.clone());
        match outgoing {
            Some(tx) => tx.try_send(OutboundMessage::Text(text)).is_ok(),
            None => false,
        }
    }

    // === Receiving ===

    async fn read_loop(
        self: Arc<Self>,
        mut incoming: mpsc::Receiver<InboundMessage>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            let message = tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break,
                message = incoming.recv() => message,
            };

            let lost = match message {
                Some(InboundMessage::Closed) | None => GatewayError::Closed,
                Some(InboundMessage::Failed(e)) => GatewayError::WebSocket(e),
                Some(message) => {
                    if let Ok(Some(frame)) = self.decode_message(message) {
                        self.handle_frame(frame);
                    }
                    continue;
                }
            };

            // A stopped link was replaced on purpose
            if !*stop.borrow() {
                self.fail_connection(lost);
            }
            break;
        }
        tracing::debug!("Read loop ended");
    }

    /// Decode a socket message; undecodable messages are logged and skipped
    fn decode_message(&self, message: InboundMessage) -> GatewayResult<Option<Frame>> {
        let decoded = match message {
            InboundMessage::Text(text) => decode(text.as_bytes(), false),
            InboundMessage::Binary(bytes) => decode(&bytes, self.ctx.config.gateway.compress),
            InboundMessage::Closed => return Err(GatewayError::Closed),
            InboundMessage::Failed(e) => return Err(GatewayError::WebSocket(e)),
        };

        match decoded {
            Ok(frame) => {
                tracing::trace!(%frame, "Frame received");
                Ok(Some(frame))
            }
            Err(e) => {
                tracing::error!(error = %e, "Dropping undecodable frame");
                Ok(None)
            }
        }
    }

    /// Route one received frame
    pub(super) fn handle_frame(&self, frame: Frame) {
        match frame.signal() {
            Signal::Event => {
                self.ctx.dispatcher.dispatch(frame);
            }
            Signal::Pong => self.pong(),
            Signal::Reconnect => {
                let payload = frame.as_reconnect().unwrap_or_default();
                tracing::warn!(
                    code = ?payload.code,
                    err = ?payload.err,
                    "Server requested reconnect"
                );
                self.fail_connection(GatewayError::ReconnectRequested { code: payload.code });
            }
            Signal::ResumeAck => match frame.as_resume_ack() {
                Some(ack) => {
                    tracing::info!("Resume finished");
                    self.ctx.session.set_id(ack.session_id);
                }
                None => tracing::warn!("Malformed RESUME_ACK payload"),
            },
            Signal::Hello => tracing::debug!("Unexpected HELLO on an open connection, ignoring"),
            Signal::Ping | Signal::Resume => {
                tracing::debug!(signal = %frame.signal(), "Client-only signal from server, ignoring");
            }
        }
    }

    // === Helpers ===

    /// Sleep, returning early with `ShuttingDown` if the client stops
    pub(super) async fn sleep_or_shutdown(&self, delay: Duration) -> GatewayResult<()> {
        let mut shutdown = self.ctx.shutdown_signal();
        tokio::select! {
            () = tokio::time::sleep(delay) => self.ensure_running(),
            _ = shutdown.wait_for(|stop| *stop) => Err(GatewayError::ShuttingDown),
        }
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("state", &self.state())
            .field("timeout", &self.is_timed_out())
            .field("require_reconnect", &self.is_reconnect_required())
            .field("session", &self.ctx.session)
            .finish()
    }
}
