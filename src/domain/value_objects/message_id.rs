//! Message identity
//!
//! A message is known either by a client-local id (assigned before the server
//! has seen it) or by the id the server assigned. Reconciliation swaps the
//! former for the latter; the two are never both meaningful for one entry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix used for client-local ids
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MessageId {
    /// Optimistic echo awaiting server confirmation
    Local(String),
    /// Server-assigned id
    Server(String),
}

impl MessageId {
    /// Generate a fresh client-local id.
    pub fn new_local() -> Self {
        MessageId::Local(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()))
    }

    pub fn server(id: impl Into<String>) -> Self {
        MessageId::Server(id.into())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }

    /// The server id, if confirmed.
    pub fn server_id(&self) -> Option<&str> {
        match self {
            MessageId::Server(id) => Some(id),
            MessageId::Local(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Local(id) | MessageId::Server(id) => id,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
