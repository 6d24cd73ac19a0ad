//! Per-connection session state
//!
//! The session outlives individual socket reconnects. It tracks the gateway
//! session id, the high-water sequence number, and the buffer of frames that
//! arrived ahead of their turn.

use crate::protocol::Frame;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Highest sequence number before the stream wraps back to 1
pub const MAX_SEQUENCE: u64 = 65535;

/// Sequence number expected after `current`
#[must_use]
pub const fn next_sequence(current: u64) -> u64 {
    if current >= MAX_SEQUENCE {
        1
    } else {
        current + 1
    }
}

/// Whether `actual` lies ahead of `expected` on the wrapping sequence ring
fn is_ahead(actual: u64, expected: u64) -> bool {
    let distance = (actual + MAX_SEQUENCE - expected) % MAX_SEQUENCE;
    distance != 0 && distance < MAX_SEQUENCE / 2
}

/// Outcome of offering a frame to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame and `count - 1` buffered successors were delivered
    Delivered { count: usize },
    /// The frame is ahead of the expected position and was buffered
    Buffered { expected: u64 },
    /// The frame is at or behind the current position and was dropped
    Duplicate { current: u64 },
    /// The frame carried no sequence number and was delivered as is
    Unsequenced,
}

/// Session state shared by the transports and the dispatcher
pub struct Session {
    id: RwLock<Option<String>>,
    sequence: AtomicU64,
    /// Frames that arrived ahead of the expected sequence number, keyed by `sn`
    buffer: Mutex<BTreeMap<u64, Frame>>,
    /// Held while frames are handed out, keeping deliveries in sequence order
    delivery: Mutex<()>,
    sequence_tx: watch::Sender<u64>,
}

impl Session {
    /// Create a fresh session starting at sequence 0
    pub fn new() -> Self {
        Self::with_sequence(0)
    }

    /// Create a session resuming numbering from a persisted sequence number
    pub fn with_sequence(sequence: u64) -> Self {
        let (sequence_tx, _) = watch::channel(sequence);
        Self {
            id: RwLock::new(None),
            sequence: AtomicU64::new(sequence),
            buffer: Mutex::new(BTreeMap::new()),
            delivery: Mutex::new(()),
            sequence_tx,
        }
    }

    pub fn id(&self) -> Option<String> {
        self.id.read().clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        *self.id.write() = Some(id.into());
    }

    /// Current high-water sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Overwrite the sequence number (used when restoring from disk)
    pub fn set_sequence(&self, sequence: u64) {
        let _buffer = self.buffer.lock();
        self.store_sequence(sequence);
    }

    /// Number of frames waiting for a gap to fill
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Subscribe to sequence number updates
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sequence_tx.subscribe()
    }

    /// Zero the sequence number and drop buffered frames
    ///
    /// Called at the start of every reconnect attempt. The session id is kept.
    pub fn reset(&self) {
        let mut buffer = self.buffer.lock();
        let dropped = buffer.len();
        buffer.clear();
        self.store_sequence(0);
        if dropped > 0 {
            tracing::debug!(dropped, "Cleared resume buffer");
        }
    }

    /// Offer a frame for in-order delivery
    ///
    /// `deliver` runs for the frame itself and for every buffered successor the
    /// frame unblocks, in sequence order. Deliveries are serialised, but the
    /// buffer lock is released first, so `deliver` may read the session.
    /// Calling `accept` again from inside `deliver` deadlocks.
    pub fn accept<F>(&self, frame: Frame, mut deliver: F) -> Delivery
    where
        F: FnMut(Frame),
    {
        let Some(actual) = frame.sequence() else {
            deliver(frame);
            return Delivery::Unsequenced;
        };

        let _delivering = self.delivery.lock();
        let (ready, delivery) = self.admit(frame, actual);
        for frame in ready {
            deliver(frame);
        }
        delivery
    }

    /// Update the sequence and buffer, returning the frames now deliverable
    fn admit(&self, frame: Frame, actual: u64) -> (Vec<Frame>, Delivery) {
        let mut buffer = self.buffer.lock();
        let current = self.sequence.load(Ordering::SeqCst);
        let expected = next_sequence(current);

        if actual == expected {
            let mut ready = vec![frame];
            self.store_sequence(actual);

            let mut next = next_sequence(actual);
            while let Some(buffered) = buffer.remove(&next) {
                tracing::debug!(sequence = next, "Processing buffered frame");
                ready.push(buffered);
                self.store_sequence(next);
                next = next_sequence(next);
            }
            let count = ready.len();
            return (ready, Delivery::Delivered { count });
        }

        if (1..=MAX_SEQUENCE).contains(&actual) && is_ahead(actual, expected) {
            tracing::warn!(expected, actual, "Out-of-order sequence number, buffering");
            buffer.insert(actual, frame);
            return (Vec::new(), Delivery::Buffered { expected });
        }

        tracing::warn!(current, actual, "Stale sequence number, dropping frame");
        (Vec::new(), Delivery::Duplicate { current })
    }

    fn store_sequence(&self, sequence: u64) {
        self.sequence.store(sequence, Ordering::SeqCst);
        self.sequence_tx.send_replace(sequence);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("sequence", &self.sequence())
            .field("buffered", &self.buffered_len())
            .finish()
    }
}
