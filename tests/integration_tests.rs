//! Integration Tests Entry Point
//!
//! This file serves as the entry point for integration tests.
//! Tests are organized by module:
//! - `chat/` - Chat client flows over an in-memory real-time server
//! - `common/` - Shared test utilities

mod chat;
mod common;

// Re-export common utilities for tests
pub use common::*;
