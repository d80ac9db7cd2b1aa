//! HTTP Module
//!
//! REST collaborators of the chat core.

mod history_client;

pub use history_client::HistoryClient;
