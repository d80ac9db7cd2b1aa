//! Chat client flows against the in-memory real-time server

mod connection_tests;
mod conversation_tests;
