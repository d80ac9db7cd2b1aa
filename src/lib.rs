//! # Dashboard Chat Library
//!
//! This crate provides the real-time chat core of the task dashboard:
//! - A Socket.IO connection manager with bounded retry
//! - A conversation engine with optimistic sends and reconciliation
//! - Unread counts, typing indicators and presence
//! - A REST client for chat history
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Messages, conversations, sessions and the history trait
//! - **Application Layer**: Conversation engine, async chat client and DTOs
//! - **Infrastructure Layer**: Real-time transport, REST client, caches, metrics
//!
//! ## Module Structure
//!
//! ```text
//! dashboard_chat/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities, value objects, and traits
//! +-- application/    Conversation engine, chat client and DTOs
//! +-- infrastructure/ Socket.IO client, REST client, caches, metrics
//! +-- shared/         Common utilities (errors, validation)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core data model
pub mod domain;

// Application layer - Chat logic
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Shared utilities
pub mod shared;

// Application startup and wiring
pub mod startup;

// Telemetry and observability
pub mod telemetry;
