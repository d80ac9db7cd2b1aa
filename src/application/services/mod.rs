//! Application Services
//!
//! ## Available Services
//!
//! - **ConversationEngine**: timelines, summaries, typing and presence state
//! - **ChatClient**: async facade that drives the engine

pub mod chat_service;
pub mod conversation_engine;

pub use chat_service::{ChatClient, ChatView};
pub use conversation_engine::{ChatUpdate, ConversationEngine, EngineConfig, Outbox};
