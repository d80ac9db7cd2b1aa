//! In-process transport
//!
//! Pairs a [`MemoryTransport`] with a [`MemoryServer`] that sees every link the
//! client opens and can script the server side of the Socket.IO exchange.
//! Used for tests and local demos where no real server is available.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc as link;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::protocol::{EnginePacket, OpenPayload, SocketPacket};
use super::transport::{Transport, TransportError, TransportLink};

/// Client half: implements [`Transport`]
#[derive(Clone)]
pub struct MemoryTransport {
    accept_tx: mpsc::UnboundedSender<ServerLink>,
    opens: Arc<AtomicUsize>,
    refusals: Arc<AtomicUsize>,
}

/// Server half: accepts links opened by the paired transport
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<ServerLink>,
    opens: Arc<AtomicUsize>,
    refusals: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let opens = Arc::new(AtomicUsize::new(0));
        let refusals = Arc::new(AtomicUsize::new(0));

        (
            MemoryTransport {
                accept_tx,
                opens: opens.clone(),
                refusals: refusals.clone(),
            },
            MemoryServer {
                accept_rx,
                opens,
                refusals,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<TransportLink, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Io("connection refused".into()));
        }

        let (client_tx, server_rx) = link::unbounded::<EnginePacket>();
        let (server_tx, client_rx) = link::unbounded::<Result<EnginePacket, TransportError>>();

        self.accept_tx
            .send(ServerLink {
                tx: server_tx,
                rx: server_rx,
            })
            .map_err(|_| TransportError::Io("server is gone".into()))?;

        Ok(TransportLink {
            sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(client_rx),
        })
    }
}

impl MemoryServer {
    /// Next link opened by the client.
    pub async fn accept(&mut self) -> Option<ServerLink> {
        self.accept_rx.recv().await
    }

    /// Number of `open` calls so far, refused ones included.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Fail the next `n` opens with an I/O error.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }
}

/// Server side of one link
pub struct ServerLink {
    tx: link::UnboundedSender<Result<EnginePacket, TransportError>>,
    rx: link::UnboundedReceiver<EnginePacket>,
}

impl ServerLink {
    pub fn send(&self, packet: EnginePacket) -> bool {
        self.tx.unbounded_send(Ok(packet)).is_ok()
    }

    /// Fail the link with a transport error, as a network drop would.
    pub fn fail(&self, reason: &str) {
        let _ = self
            .tx
            .unbounded_send(Err(TransportError::Io(reason.to_string())));
    }

    /// Engine.IO open handshake.
    pub fn open(&self, ping_interval: u64, ping_timeout: u64) -> bool {
        self.send(EnginePacket::Open(OpenPayload {
            sid: uuid::Uuid::new_v4().to_string(),
            upgrades: Vec::new(),
            ping_interval,
            ping_timeout,
            max_payload: Some(1_000_000),
        }))
    }

    pub fn accept_connect(&self) -> bool {
        self.send(EnginePacket::Message(SocketPacket::Connect(Some(
            json!({ "sid": uuid::Uuid::new_v4().to_string() }),
        ))))
    }

    pub fn reject_connect(&self, message: &str) -> bool {
        self.send(EnginePacket::Message(SocketPacket::ConnectError(
            message.to_string(),
        )))
    }

    pub fn emit(&self, name: &str, payload: Value) -> bool {
        self.send(EnginePacket::event(name, payload))
    }

    pub fn ping(&self) -> bool {
        self.send(EnginePacket::Ping(String::new()))
    }

    /// Server-initiated Socket.IO disconnect.
    pub fn disconnect(&self) -> bool {
        self.send(EnginePacket::Message(SocketPacket::Disconnect))
    }

    /// Next packet from the client; `None` once the client dropped the link.
    pub async fn recv(&mut self) -> Option<EnginePacket> {
        self.rx.next().await
    }

    /// Wait for the client's CONNECT and return its auth object.
    pub async fn expect_connect(&mut self) -> Option<Value> {
        while let Some(packet) = self.recv().await {
            if let EnginePacket::Message(SocketPacket::Connect(auth)) = packet {
                return Some(auth.unwrap_or(Value::Null));
            }
        }
        None
    }

    /// Full successful handshake; returns the client's auth object.
    pub async fn handshake(&mut self) -> Option<Value> {
        self.open(25_000, 20_000);
        let auth = self.expect_connect().await?;
        self.accept_connect();
        Some(auth)
    }

    /// Next Socket.IO event from the client, skipping heartbeats.
    pub async fn next_event(&mut self) -> Option<(String, Value)> {
        while let Some(packet) = self.recv().await {
            if let EnginePacket::Message(SocketPacket::Event { name, payload, .. }) = packet {
                return Some((name, payload));
            }
        }
        None
    }
}
