//! Application Startup
//!
//! Wires the chat client from settings and runs it headless.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;

use crate::application::services::{ChatClient, ChatUpdate};
use crate::config::{SessionSettings, Settings};
use crate::domain::{AuthenticatedSession, Role};
use crate::infrastructure::cache::SessionStore;
use crate::infrastructure::http::HistoryClient;
use crate::infrastructure::metrics;
use crate::infrastructure::realtime::{ConnectionManager, WebSocketTransport};

/// Application instance
pub struct Application {
    client: ChatClient,
    sessions: Arc<SessionStore>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let sessions = Arc::new(SessionStore::new());
        match session_from_settings(&settings.session) {
            Some(session) => sessions.login(session),
            None => tracing::warn!("No session configured, connecting will fail"),
        }

        let transport = WebSocketTransport::new(&settings.realtime.url);
        tracing::info!(endpoint = %transport.endpoint(), "Real-time endpoint configured");

        let connection = Arc::new(ConnectionManager::new(
            settings.realtime.clone(),
            Arc::new(transport),
            sessions.clone(),
        ));

        let history = HistoryClient::new(&settings.api, sessions.clone())
            .context("Failed to build history client")?;
        tracing::info!(base_url = %settings.api.base_url, "History client created");

        let client = ChatClient::new(&settings.chat, connection, Arc::new(history), sessions.clone());

        Ok(Self { client, sessions })
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Connect, load conversations and log every update until Ctrl-C
    pub async fn run_until_stopped(self) -> Result<()> {
        let mut updates = self.client.updates();

        self.client
            .connect()
            .await
            .context("Failed to connect to the real-time server")?;

        match self.client.load_conversations().await {
            Ok(count) => tracing::info!(count, "Conversations loaded"),
            Err(e) => tracing::warn!(error = %e, "Failed to load conversations"),
        }
        match self.client.refresh_unread_total().await {
            Ok(total) => tracing::info!(total, "Unread messages"),
            Err(e) => tracing::warn!(error = %e, "Failed to get unread count"),
        }

        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(update) => log_update(&update),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Update log fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.client.logout();
        tracing::debug!(metrics = %metrics::gather_metrics(), "Final metrics");
        tracing::info!(logged_in = self.sessions.current().is_some(), "Stopped");
        Ok(())
    }
}

/// Session described by the configuration, if complete.
pub fn session_from_settings(settings: &SessionSettings) -> Option<AuthenticatedSession> {
    let user_id = settings.user_id.as_deref().filter(|id| !id.is_empty())?;
    let token = settings.token.as_deref().filter(|token| !token.is_empty())?;
    let role = settings
        .role
        .as_deref()
        .map(Role::parse)
        .unwrap_or(Role::Unknown);

    let session = AuthenticatedSession::new(user_id, role, token);
    Some(match &settings.name {
        Some(name) => session.with_name(name.as_str()),
        None => session,
    })
}

fn log_update(update: &ChatUpdate) {
    match update {
        ChatUpdate::ConnectionChanged(state) => {
            tracing::info!(
                status = %state.status,
                error = ?state.last_error.as_ref().map(ToString::to_string),
                "Connection"
            );
        }
        ChatUpdate::SendFailed { peer_id, reason, .. } => {
            tracing::warn!(peer_id = ?peer_id, reason = %reason, "Message not sent");
        }
        ChatUpdate::Error { context, message } => {
            tracing::warn!(context = %context, message = %message, "Chat error");
        }
        other => tracing::debug!(update = ?other, "Chat update"),
    }
}
