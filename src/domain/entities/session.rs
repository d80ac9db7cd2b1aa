//! Authenticated session identity.
//!
//! The chat core never creates or mutates a session; it reads the current one
//! through [`SessionProvider`] as a precondition for connecting and sending.

use serde::{Deserialize, Serialize};

/// Dashboard role of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Employee,
    /// Role string the client does not recognise
    #[default]
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Parse a role string, case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "owner" => Self::Owner,
            "employee" => Self::Employee,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Employee => "employee",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The signed-in principal plus the credential presented to the servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub user_id: String,
    pub role: Role,
    pub name: Option<String>,

    /// Bearer credential; never serialized
    #[serde(skip_serializing, default)]
    pub token: String,
}

impl AuthenticatedSession {
    pub fn new(user_id: impl Into<String>, role: Role, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            name: None,
            token: token.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}

/// Read-only access to the current session.
pub trait SessionProvider: Send + Sync {
    /// The current session, or `None` when signed out.
    fn current_session(&self) -> Option<AuthenticatedSession>;

    fn is_authenticated(&self) -> bool {
        self.current_session().is_some()
    }
}
