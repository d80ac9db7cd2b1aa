//! Socket Event Types
//!
//! Named events exchanged with the chat server and their payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::protocol::ProtocolError;
use crate::application::dto::MessageRecord;
use crate::domain::{Message, MessageKind};

/// Event names on the wire
pub mod names {
    // Server -> client
    pub const CONNECTION_CONFIRMED: &str = "connection_confirmed";
    pub const USER_ONLINE: &str = "user_online";
    pub const USER_OFFLINE: &str = "user_offline";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const MESSAGE_SENT: &str = "message_sent";
    pub const MESSAGE_ERROR: &str = "message_error";
    pub const MESSAGE_READ: &str = "message_read";
    pub const MESSAGE_READ_CONFIRMATION: &str = "message_read_confirmation";
    pub const USER_TYPING: &str = "user_typing";
    pub const USER_STOPPED_TYPING: &str = "user_stopped_typing";
    pub const PONG: &str = "pong";

    // Client -> server
    pub const PRIVATE_MESSAGE: &str = "private_message";
    pub const TYPING_START: &str = "typing_start";
    pub const TYPING_STOP: &str = "typing_stop";
    pub const PING: &str = "ping";
}

/// `connection_confirmed` payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfirmedPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `user_online` / `user_offline` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: String,
}

/// `user_typing` / `user_stopped_typing` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: String,
}

/// `message_error` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageErrorPayload {
    #[serde(default = "default_send_error")]
    pub error: String,
}

fn default_send_error() -> String {
    "Failed to send message".to_string()
}

/// `message_read` / `message_read_confirmation` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub message_id: String,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// Events pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ConnectionConfirmed(ConnectionConfirmedPayload),
    UserOnline(PresencePayload),
    UserOffline(PresencePayload),
    /// Message addressed to the current user
    NewMessage(Message),
    /// Server echo of a message the current user sent
    MessageSent(Message),
    MessageError(MessageErrorPayload),
    /// Peer read one of the current user's messages
    MessageRead(MessageReadPayload),
    /// Server confirmed the current user's read receipt
    MessageReadConfirmation(MessageReadPayload),
    UserTyping(TypingPayload),
    UserStoppedTyping(TypingPayload),
    Pong,
}

impl InboundEvent {
    /// Decode a named event. Unknown names yield `Ok(None)`.
    pub fn decode(name: &str, payload: Value) -> Result<Option<Self>, ProtocolError> {
        let event = match name {
            names::CONNECTION_CONFIRMED => {
                let payload = if payload.is_null() {
                    ConnectionConfirmedPayload::default()
                } else {
                    serde_json::from_value(payload)?
                };
                InboundEvent::ConnectionConfirmed(payload)
            }
            names::USER_ONLINE => InboundEvent::UserOnline(serde_json::from_value(payload)?),
            names::USER_OFFLINE => InboundEvent::UserOffline(serde_json::from_value(payload)?),
            names::NEW_MESSAGE => {
                InboundEvent::NewMessage(serde_json::from_value::<MessageRecord>(payload)?.into())
            }
            names::MESSAGE_SENT => {
                InboundEvent::MessageSent(serde_json::from_value::<MessageRecord>(payload)?.into())
            }
            names::MESSAGE_ERROR => {
                let payload = if payload.is_null() {
                    MessageErrorPayload {
                        error: default_send_error(),
                    }
                } else {
                    serde_json::from_value(payload)?
                };
                InboundEvent::MessageError(payload)
            }
            names::MESSAGE_READ => InboundEvent::MessageRead(serde_json::from_value(payload)?),
            names::MESSAGE_READ_CONFIRMATION => {
                InboundEvent::MessageReadConfirmation(serde_json::from_value(payload)?)
            }
            names::USER_TYPING => InboundEvent::UserTyping(serde_json::from_value(payload)?),
            names::USER_STOPPED_TYPING => {
                InboundEvent::UserStoppedTyping(serde_json::from_value(payload)?)
            }
            names::PONG => InboundEvent::Pong,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            InboundEvent::ConnectionConfirmed(_) => names::CONNECTION_CONFIRMED,
            InboundEvent::UserOnline(_) => names::USER_ONLINE,
            InboundEvent::UserOffline(_) => names::USER_OFFLINE,
            InboundEvent::NewMessage(_) => names::NEW_MESSAGE,
            InboundEvent::MessageSent(_) => names::MESSAGE_SENT,
            InboundEvent::MessageError(_) => names::MESSAGE_ERROR,
            InboundEvent::MessageRead(_) => names::MESSAGE_READ,
            InboundEvent::MessageReadConfirmation(_) => names::MESSAGE_READ_CONFIRMATION,
            InboundEvent::UserTyping(_) => names::USER_TYPING,
            InboundEvent::UserStoppedTyping(_) => names::USER_STOPPED_TYPING,
            InboundEvent::Pong => names::PONG,
        }
    }
}

/// `private_message` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessagePayload {
    pub recipient_id: String,
    pub message: String,
    pub message_type: MessageKind,
}

/// `typing_start` / `typing_stop` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingTarget {
    pub recipient_id: String,
}

/// `message_read` payload sent by the reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: String,
}

/// Events the client emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    PrivateMessage(PrivateMessagePayload),
    MessageRead(ReadReceipt),
    TypingStart(TypingTarget),
    TypingStop(TypingTarget),
    Ping,
}

impl OutboundEvent {
    pub fn private_message(recipient_id: &str, message: &str, message_type: MessageKind) -> Self {
        OutboundEvent::PrivateMessage(PrivateMessagePayload {
            recipient_id: recipient_id.to_string(),
            message: message.to_string(),
            message_type,
        })
    }

    pub fn typing_start(recipient_id: &str) -> Self {
        OutboundEvent::TypingStart(TypingTarget {
            recipient_id: recipient_id.to_string(),
        })
    }

    pub fn typing_stop(recipient_id: &str) -> Self {
        OutboundEvent::TypingStop(TypingTarget {
            recipient_id: recipient_id.to_string(),
        })
    }

    pub fn message_read(message_id: &str) -> Self {
        OutboundEvent::MessageRead(ReadReceipt {
            message_id: message_id.to_string(),
        })
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundEvent::PrivateMessage(_) => names::PRIVATE_MESSAGE,
            OutboundEvent::MessageRead(_) => names::MESSAGE_READ,
            OutboundEvent::TypingStart(_) => names::TYPING_START,
            OutboundEvent::TypingStop(_) => names::TYPING_STOP,
            OutboundEvent::Ping => names::PING,
        }
    }

    /// Event argument; `Null` means the event carries none.
    pub fn to_json(&self) -> Value {
        match self {
            OutboundEvent::PrivateMessage(p) => serde_json::to_value(p).unwrap_or_default(),
            OutboundEvent::MessageRead(p) => serde_json::to_value(p).unwrap_or_default(),
            OutboundEvent::TypingStart(p) | OutboundEvent::TypingStop(p) => {
                serde_json::to_value(p).unwrap_or_default()
            }
            OutboundEvent::Ping => Value::Null,
        }
    }
}
