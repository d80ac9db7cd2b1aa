//! Session Store
//!
//! In-memory holder of the signed-in session.

use parking_lot::RwLock;

use crate::domain::{AuthenticatedSession, SessionProvider};

/// Current session, shared by the connection manager and the REST client
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<AuthenticatedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store is pre-seeded with a session
    pub fn with_session(session: AuthenticatedSession) -> Self {
        Self {
            current: RwLock::new(Some(session)),
        }
    }

    /// Replace the current session
    pub fn login(&self, session: AuthenticatedSession) {
        tracing::info!(user_id = %session.user_id, role = %session.role, "Session started");
        *self.current.write() = Some(session);
    }

    /// Clear the current session. Returns the session that was active.
    pub fn logout(&self) -> Option<AuthenticatedSession> {
        let previous = self.current.write().take();
        if let Some(session) = &previous {
            tracing::info!(user_id = %session.user_id, "Session ended");
        }
        previous
    }

    pub fn current(&self) -> Option<AuthenticatedSession> {
        self.current.read().clone()
    }
}

impl SessionProvider for SessionStore {
    fn current_session(&self) -> Option<AuthenticatedSession> {
        self.current()
    }
}
