//! # Domain Layer
//!
//! The domain layer holds the chat core's data model. It knows nothing about
//! sockets or HTTP.
//!
//! ## Structure
//!
//! - **entities**: Message, Timeline, ConversationSummary, AuthenticatedSession
//! - **value_objects**: MessageId

pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
