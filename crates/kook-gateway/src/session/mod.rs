//! Session tracking
//!
//! Sequence ordering shared by both transports, plus the on-disk record of the
//! last delivered sequence number.

mod sequence_store;
mod session;

pub use sequence_store::{SequenceStore, SequenceStoreError};
pub use session::{next_sequence, Delivery, Session, MAX_SEQUENCE};
