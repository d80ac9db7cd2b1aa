//! Channel handle
//!
//! The narrow view of the connection handed to consumers: emit, subscribe and
//! status. A `Channel` can never close or reopen the link it fronts.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::connection::{ConnectionState, ConnectionStatus, Shared};
use super::events::{InboundEvent, OutboundEvent};

/// Emission failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed while emitting")]
    Closed,
}

/// Fire-and-forget emission target
///
/// The conversation engine only needs to know whether it may emit, and to
/// emit. [`Channel`] is the production implementation.
pub trait EventSink: Send + Sync {
    fn is_connected(&self) -> bool;

    fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError>;
}

/// Scoped handle to the connection manager's link
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

impl Channel {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Queue an event for the server. Does not wait for delivery.
    pub fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        let control = self.shared.control.lock();
        match &control.outbound {
            Some(outbound) => outbound.send(event).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::NotConnected),
        }
    }

    /// Inbound events in delivery order. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.shared.events_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state_tx.borrow().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }
}

impl EventSink for Channel {
    fn is_connected(&self) -> bool {
        Channel::is_connected(self)
    }

    fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        Channel::emit(self, event)
    }
}
