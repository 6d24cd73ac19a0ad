//! Gateway protocol definitions
//!
//! Signal types, the frame model, handshake codes, and the wire codec.

mod codec;
mod frame;
mod hello_codes;
mod payloads;
mod signal;

pub use codec::{decode, inflate, parse, DecodeError};
pub use frame::Frame;
pub use hello_codes::HelloCode;
pub use payloads::{HelloPayload, ReconnectPayload, ResumeAckPayload};
pub use signal::Signal;
