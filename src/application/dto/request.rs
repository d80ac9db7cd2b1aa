//! Request DTOs
//!
//! Validated inputs for user actions.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::MessageKind;

/// Longest body the server accepts
pub const MAX_MESSAGE_LENGTH: u64 = 4000;

/// Send message request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "Recipient is required"))]
    pub recipient_id: String,

    #[validate(length(min = 1, max = 4000, message = "Message must be 1-4000 characters"))]
    pub body: String,

    pub kind: MessageKind,
}

impl SendMessageRequest {
    /// Build a request with surrounding whitespace trimmed from the body.
    pub fn new(recipient_id: &str, body: &str, kind: MessageKind) -> Self {
        Self {
            recipient_id: recipient_id.trim().to_string(),
            body: body.trim().to_string(),
            kind,
        }
    }
}

/// History query parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, message = "Page starts at 1"))]
    pub page: u32,

    #[validate(range(min = 1, max = 100, message = "Limit must be 1-100"))]
    pub limit: u32,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}
