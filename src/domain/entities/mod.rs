//! # Domain Entities
//!
//! Core domain entities of the chat core.
//!
//! - **Message**: one message between two parties, optimistic or confirmed
//! - **Conversation**: the per-peer timeline and its derived summary
//! - **Session**: the authenticated principal the core acts for
//!
//! ## Repository Traits
//!
//! [`ChatHistoryRepository`] defines the remote history contract. It is
//! implemented in the infrastructure layer by the REST client.

mod conversation;
mod message;
mod session;

pub use conversation::{ChatHistoryRepository, ConversationSummary, HistoryPage, Timeline};
pub use message::{DeliveryStatus, Message, MessageKind};
pub use session::{AuthenticatedSession, Role, SessionProvider};

#[cfg(test)]
pub use conversation::MockChatHistoryRepository;
