//! Real-time Module
//!
//! Socket.IO client plumbing for the chat server.
//!
//! # Architecture
//!
//! ```text
//! +---------------------+        +------------------+
//! |  ConnectionManager  |------->|  Transport       |  WebSocket / in-memory
//! |  (supervisor task)  |        +------------------+
//! +---------------------+
//!      |          ^
//!      | events   | emit
//!      v          |
//! +---------------------+
//! |  Channel            |  <-- handed to the conversation engine
//! +---------------------+
//! ```
//!
//! - `protocol`: Engine.IO / Socket.IO packet codec
//! - `events`: typed inbound and outbound events
//! - `transport`: link abstraction and the WebSocket implementation
//! - `connection`: connection state machine with bounded retry
//! - `channel`: emit/subscribe handle
//! - `memory`: in-process transport for tests and demos

mod channel;
mod connection;
pub mod events;
pub mod memory;
pub mod protocol;
mod transport;

pub use channel::{Channel, ChannelError, EventSink};
pub use connection::{ConnectionError, ConnectionManager, ConnectionState, ConnectionStatus};
pub use events::{InboundEvent, OutboundEvent};
pub use memory::{MemoryServer, MemoryTransport, ServerLink};
pub use transport::{
    socket_endpoint, PacketSink, PacketStream, Transport, TransportError, TransportLink,
    WebSocketTransport,
};
