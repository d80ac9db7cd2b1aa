//! Transport abstraction
//!
//! A transport opens one duplex link carrying Engine.IO packets. The
//! connection manager owns every link it opens and is the only component that
//! ever calls [`Transport::open`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use super::protocol::{EnginePacket, ProtocolError};

/// Link-level failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Link closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type PacketSink = Pin<Box<dyn Sink<EnginePacket, Error = TransportError> + Send>>;
pub type PacketStream = Pin<Box<dyn Stream<Item = Result<EnginePacket, TransportError>> + Send>>;

/// Both halves of an open link
pub struct TransportLink {
    pub sink: PacketSink,
    pub stream: PacketStream,
}

/// Factory for links to the real-time server
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self) -> Result<TransportLink, TransportError>;
}

/// Socket.IO over WebSocket
pub struct WebSocketTransport {
    endpoint: String,
}

impl WebSocketTransport {
    /// `base_url` is the server origin, e.g. `http://localhost:8080`.
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: socket_endpoint(base_url),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> Result<TransportLink, TransportError> {
        let (socket, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        tracing::debug!(endpoint = %self.endpoint, "WebSocket established");

        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|e| TransportError::Io(e.to_string()))
            .with(|packet: EnginePacket| {
                future::ready(Ok::<_, TransportError>(WsMessage::Text(packet.encode())))
            });

        let stream = read.filter_map(|frame| {
            future::ready(match frame {
                Ok(WsMessage::Text(text)) => {
                    Some(EnginePacket::decode(&text).map_err(TransportError::from))
                }
                Ok(WsMessage::Close(_)) => Some(Err(TransportError::Closed)),
                // Binary attachments and WebSocket-level ping/pong are not used
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Io(e.to_string()))),
            })
        });

        Ok(TransportLink {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Build the Socket.IO WebSocket endpoint for a server origin.
pub fn socket_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/socket.io/?EIO=4&transport=websocket", base)
}
