//! Value Objects
//!
//! Immutable value types used throughout the domain layer.

mod message_id;

pub use message_id::{MessageId, LOCAL_ID_PREFIX};
