//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Real-time connection to the chat server (Socket.IO over WebSocket)
//! - REST client for chat history
//! - In-memory caches for session, typing and presence state
//! - Prometheus metrics

pub mod cache;
pub mod http;
pub mod metrics;
pub mod realtime;
