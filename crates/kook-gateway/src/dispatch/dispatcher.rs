//! Frame dispatcher
//!
//! The dispatch boundary shared by both transports: EVENT frames pass through
//! the session's ordering and are handed to the application's [`FrameHandler`].

use crate::protocol::{Frame, Signal};
use crate::session::{Delivery, Session};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Application hook receiving frames in delivery order
///
/// Called synchronously from the transport's read path; implementations must
/// be fast or hand the work off themselves. Reading the session from a handler
/// is fine; dispatching another frame from inside `handle` deadlocks.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, frame: Frame);
}

impl<F> FrameHandler for F
where
    F: Fn(Frame) + Send + Sync,
{
    fn handle(&self, frame: Frame) {
        self(frame);
    }
}

/// Handler that only logs what it receives
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl FrameHandler for LoggingHandler {
    fn handle(&self, frame: Frame) {
        tracing::info!(
            sequence = ?frame.sequence(),
            event_type = ?frame.payload().get("type"),
            channel_type = frame.payload_str("channel_type"),
            "Event received"
        );
    }
}

/// Routes event frames through the session to the handler
pub struct Dispatcher {
    session: Arc<Session>,
    handler: Arc<dyn FrameHandler>,
    /// Frames handed to the handler so far
    delivered: AtomicU64,
}

impl Dispatcher {
    pub fn new(session: Arc<Session>, handler: Arc<dyn FrameHandler>) -> Self {
        Self {
            session,
            handler,
            delivered: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Offer an EVENT frame for ordered delivery
    ///
    /// Control frames are the transports' business and are rejected here.
    pub fn dispatch(&self, frame: Frame) -> Option<Delivery> {
        if frame.signal() != Signal::Event {
            tracing::debug!(signal = %frame.signal(), "Control frame reached dispatcher, ignoring");
            return None;
        }

        tracing::trace!(sequence = ?frame.sequence(), "Dispatching event");
        let delivery = self.session.accept(frame, |f| {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            self.handler.handle(f);
        });
        Some(delivery)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("session", &self.session)
            .field("delivered", &self.delivered_count())
            .finish()
    }
}
