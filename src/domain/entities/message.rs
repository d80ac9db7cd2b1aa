//! Chat message entity.
//!
//! One message between two parties. The wire shape lives in
//! `application::dto`; this is the in-memory form the engine keeps in
//! timelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::{AuthenticatedSession, Role};
use crate::domain::value_objects::MessageId;

/// Content kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery status. Ordered: `Sent < Delivered < Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

/// A message in a one-to-one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: String,
    pub sender_role: Role,
    pub recipient_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub read_at: Option<DateTime<Utc>>,

    /// The server rejected this send; the entry is kept for the UI to flag
    #[serde(default)]
    pub failed: bool,
}

impl Message {
    /// Build the optimistic echo for a message the current user is sending.
    pub fn optimistic(
        sender: &AuthenticatedSession,
        recipient_id: impl Into<String>,
        body: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: MessageId::new_local(),
            sender_id: sender.user_id.clone(),
            sender_role: sender.role,
            recipient_id: recipient_id.into(),
            body: body.into(),
            kind,
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
            read_at: None,
            failed: false,
        }
    }

    /// Still waiting for the server to confirm it.
    pub fn is_pending(&self) -> bool {
        self.id.is_local()
    }

    /// The other party of the conversation, seen from `me`.
    pub fn counterpart(&self, me: &str) -> &str {
        if self.sender_id == me {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }

    /// Move the delivery status forward. Never moves it back.
    pub fn advance_status(&mut self, status: DeliveryStatus) -> bool {
        if status > self.status {
            self.status = status;
            true
        } else {
            false
        }
    }

    /// Record that the recipient read this message.
    pub fn mark_read(&mut self, at: Option<DateTime<Utc>>) -> bool {
        let changed = self.advance_status(DeliveryStatus::Read);
        if self.read_at.is_none() {
            self.read_at = Some(at.unwrap_or_else(Utc::now));
        }
        changed
    }
}
