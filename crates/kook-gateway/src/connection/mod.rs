//! Outbound socket transport
//!
//! The connector and its background loops: per-socket read loop and heartbeat,
//! plus the client-lifetime reconnect watcher.

mod connector;
mod heartbeat;
mod socket;
mod state;
mod watcher;

pub use connector::Connector;
pub use socket::{InboundMessage, OutboundMessage, SocketDialer, SocketLink, TungsteniteDialer};
pub use state::{ConnectionState, ConnectorConfig};
