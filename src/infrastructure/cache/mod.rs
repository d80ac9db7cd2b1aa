//! Cache Module
//!
//! In-process state caches used by the chat core.
//!
//! This module provides:
//! - `SessionStore`: the signed-in session, readable through `SessionProvider`
//! - `TypingCache`: per-peer typing flags with deadline-based expiry
//! - `PresenceCache`: the set of peers currently online
//!
//! None of these persist anything; they are rebuilt from live events.

mod presence_cache;
mod session_cache;
mod typing_cache;

pub use presence_cache::PresenceCache;
pub use session_cache::SessionStore;
pub use typing_cache::TypingCache;
