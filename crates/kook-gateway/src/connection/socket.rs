//! Socket abstraction
//!
//! The connector talks to a socket through a pair of channels. The tungstenite
//! dialer pumps those channels against a real WebSocket; tests plug in their own.

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

/// Channel capacity in each direction
const LINK_BUFFER: usize = 256;

/// Message sent to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    /// Close the socket with a normal closure
    Close,
}

/// Message received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(String),
    Binary(Vec<u8>),
    /// The server closed the socket
    Closed,
    /// The socket failed
    Failed(String),
}

/// An open socket, as seen by the connector
#[derive(Debug)]
pub struct SocketLink {
    pub outgoing: mpsc::Sender<OutboundMessage>,
    pub incoming: mpsc::Receiver<InboundMessage>,
}

impl SocketLink {
    /// Create a link and the peer ends of its channels
    pub fn pair() -> (
        Self,
        mpsc::Receiver<OutboundMessage>,
        mpsc::Sender<InboundMessage>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);
        (
            Self {
                outgoing: out_tx,
                incoming: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

/// Opens sockets to a gateway URL
#[async_trait]
pub trait SocketDialer: Send + Sync {
    async fn dial(&self, url: &str) -> GatewayResult<SocketLink>;
}

/// Dialer backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteDialer;

#[async_trait]
impl SocketDialer for TungsteniteDialer {
    async fn dial(&self, url: &str) -> GatewayResult<SocketLink> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(GatewayError::websocket)?;
        let (mut sink, mut source) = stream.split();
        let (link, mut outgoing, incoming) = SocketLink::pair();

        // Send task
        tokio::spawn(async move {
            while let Some(message) = outgoing.recv().await {
                let result = match message {
                    OutboundMessage::Text(text) => sink.send(Message::Text(text)).await,
                    OutboundMessage::Close => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: Cow::Borrowed("User Closed Service"),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Socket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Receive task
        tokio::spawn(async move {
            while let Some(result) = source.next().await {
                let inbound = match result {
                    Ok(Message::Text(text)) => InboundMessage::Text(text),
                    Ok(Message::Binary(bytes)) => InboundMessage::Binary(bytes),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Server closed socket");
                        let _ = incoming.send(InboundMessage::Closed).await;
                        return;
                    }
                    // Ping/Pong are answered by tungstenite itself
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = incoming.send(InboundMessage::Failed(e.to_string())).await;
                        return;
                    }
                };
                if incoming.send(inbound).await.is_err() {
                    return;
                }
            }
            let _ = incoming.send(InboundMessage::Closed).await;
        });

        Ok(link)
    }
}
