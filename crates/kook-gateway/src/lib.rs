//! # kook-gateway
//!
//! Real-time event ingestion for the bot client. Frames arrive either over an
//! outbound socket owned by the [`Connector`] or as webhook POSTs, and both
//! transports feed one [`Dispatcher`] that enforces sequence ordering.

pub mod api;
pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod source;
pub mod webhook;

pub use api::{GatewayApi, HttpGatewayApi};
pub use client::ClientContext;
pub use connection::{ConnectionState, Connector, ConnectorConfig};
pub use dispatch::{Dispatcher, FrameHandler, LoggingHandler};
pub use error::{GatewayError, GatewayResult};
pub use protocol::{Frame, Signal};
pub use reconnect::ReconnectStrategy;
pub use session::{Delivery, SequenceStore, Session};
pub use source::{frame_source, FrameSource, SocketFrameSource, WebhookFrameSource};
