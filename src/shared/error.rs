//! Application Error Types
//!
//! Centralized error handling for the chat core. Transport-level failures live
//! next to the connection manager; everything a caller of the chat facade can
//! see funnels into [`ChatError`].

use crate::infrastructure::realtime::{ChannelError, ConnectionError};

/// Errors surfaced to the UI layer by the chat facade
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

/// Errors raised by the remote message-history collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for HistoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            HistoryError::Decode(e.to_string())
        } else {
            HistoryError::Network(e.to_string())
        }
    }
}

impl ChatError {
    /// Whether the failure requires the user to sign in again
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            ChatError::NotAuthenticated => true,
            ChatError::Connection(e) => e.is_authentication(),
            ChatError::History(HistoryError::Unauthorized(_)) => true,
            _ => false,
        }
    }
}
