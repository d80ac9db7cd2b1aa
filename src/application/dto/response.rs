//! Response DTOs
//!
//! Wire shapes returned by the REST API and carried in socket payloads.
//! Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ConversationSummary, DeliveryStatus, HistoryPage, Message, MessageId, MessageKind, Role,
};

/// Message as serialized by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_role: Role,
    pub recipient_id: String,
    pub message: String,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: MessageId::server(record.id),
            sender_id: record.sender_id,
            sender_role: record.sender_role,
            recipient_id: record.recipient_id,
            body: record.message,
            kind: record.message_type,
            created_at: record.timestamp,
            status: record.status,
            read_at: record.read_at,
            failed: false,
        }
    }
}

/// Pagination block of a history response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationDto {
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub total: u64,
}

/// `GET /chat/history/{peer}`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatHistoryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    #[serde(default)]
    pub pagination: PaginationDto,
}

impl From<ChatHistoryResponse> for HistoryPage {
    fn from(response: ChatHistoryResponse) -> Self {
        Self {
            messages: response.messages.into_iter().map(Message::from).collect(),
            page: response.pagination.page,
            limit: response.pagination.limit,
            total: response.pagination.total,
        }
    }
}

/// Conversation entry as listed by the server
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub user_id: String,
    #[serde(default)]
    pub user_role: Role,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_message_type: MessageKind,
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

impl From<ConversationRecord> for ConversationSummary {
    fn from(record: ConversationRecord) -> Self {
        Self {
            peer_id: record.user_id,
            peer_role: record.user_role,
            last_message: record.last_message,
            last_message_kind: record.last_message_type,
            last_message_time: record.last_message_time,
            unread_count: record.unread_count,
            online: false,
        }
    }
}

/// `GET /chat/conversations`
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub conversations: Vec<ConversationRecord>,
}

/// `GET /chat/unread-count`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    #[serde(default)]
    pub success: bool,
    pub unread_count: u32,
}

/// Generic acknowledgement (`PUT /chat/mark-read/{peer}`) and error body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiAck {
    /// Best human-readable explanation the server gave
    pub fn reason(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}
