//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use dashboard_chat::application::services::{ChatClient, ChatUpdate, ChatView};
use dashboard_chat::config::{ChatSettings, RealtimeSettings};
use dashboard_chat::domain::{
    AuthenticatedSession, ChatHistoryRepository, ConversationSummary, HistoryPage, Message, Role,
};
use dashboard_chat::infrastructure::cache::SessionStore;
use dashboard_chat::infrastructure::realtime::{
    ConnectionManager, MemoryServer, MemoryTransport, ServerLink,
};
use dashboard_chat::shared::error::HistoryError;

pub const OWNER_ID: &str = "owner-1";

/// In-memory history API
#[derive(Default)]
pub struct FakeHistory {
    pages: Mutex<HashMap<String, Vec<Message>>>,
    summaries: Mutex<Vec<ConversationSummary>>,
    read_calls: Mutex<Vec<String>>,
    unread_total: Mutex<u32>,
    fail_history: Mutex<Option<HistoryError>>,
}

impl FakeHistory {
    pub fn set_history(&self, peer_id: &str, messages: Vec<Message>) {
        self.pages.lock().insert(peer_id.to_string(), messages);
    }

    pub fn set_summaries(&self, summaries: Vec<ConversationSummary>) {
        *self.summaries.lock() = summaries;
    }

    pub fn set_unread_total(&self, total: u32) {
        *self.unread_total.lock() = total;
    }

    pub fn fail_history_with(&self, error: HistoryError) {
        *self.fail_history.lock() = Some(error);
    }

    /// Peers whose conversation was marked read, in call order
    pub fn read_calls(&self) -> Vec<String> {
        self.read_calls.lock().clone()
    }
}

#[async_trait]
impl ChatHistoryRepository for FakeHistory {
    async fn fetch_history(
        &self,
        peer_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        if let Some(error) = self.fail_history.lock().clone() {
            return Err(error);
        }

        let all = self.pages.lock().get(peer_id).cloned().unwrap_or_default();
        let total = all.len() as u64;
        // Pages count back from the newest message
        let end = all.len().saturating_sub(((page.max(1) - 1) * limit) as usize);
        let start = end.saturating_sub(limit as usize);

        Ok(HistoryPage {
            messages: all[start..end].to_vec(),
            page,
            limit,
            total,
        })
    }

    async fn fetch_conversation_summaries(&self) -> Result<Vec<ConversationSummary>, HistoryError> {
        Ok(self.summaries.lock().clone())
    }

    async fn mark_read(&self, peer_id: &str) -> Result<(), HistoryError> {
        self.read_calls.lock().push(peer_id.to_string());
        Ok(())
    }

    async fn unread_count(&self) -> Result<u32, HistoryError> {
        Ok(*self.unread_total.lock())
    }
}

/// Chat client wired to an in-memory server and history
pub struct TestChat {
    pub client: ChatClient,
    pub server: MemoryServer,
    pub history: Arc<FakeHistory>,
    pub sessions: Arc<SessionStore>,
}

impl TestChat {
    pub fn new() -> Self {
        Self::with_settings(test_realtime_settings())
    }

    pub fn with_settings(realtime: RealtimeSettings) -> Self {
        let (transport, server) = MemoryTransport::pair();
        let sessions = Arc::new(SessionStore::with_session(
            AuthenticatedSession::new(OWNER_ID, Role::Owner, "test-token").with_name("Dana"),
        ));
        let history = Arc::new(FakeHistory::default());
        let connection = Arc::new(ConnectionManager::new(
            realtime,
            Arc::new(transport),
            sessions.clone(),
        ));
        let client = ChatClient::new(
            &ChatSettings::default(),
            connection,
            history.clone(),
            sessions.clone(),
        );

        Self {
            client,
            server,
            history,
            sessions,
        }
    }

    /// Connect and complete the server side of the handshake
    pub async fn connect(&mut self) -> ServerLink {
        let server = &mut self.server;
        let (result, link) = tokio::join!(self.client.connect(), async {
            let mut link = server.accept().await.expect("client never opened a link");
            link.handshake().await;
            link
        });
        result.expect("connect failed");
        link
    }

    /// Poll the view until `check` holds
    pub async fn eventually(&self, check: impl Fn(&ChatView) -> bool) -> ChatView {
        for _ in 0..200 {
            let view = self.client.view();
            if check(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:#?}", self.client.view());
    }
}

pub fn test_realtime_settings() -> RealtimeSettings {
    RealtimeSettings {
        reconnection_attempts: 3,
        reconnection_delay_ms: 20,
        connect_timeout_ms: 1000,
        ..RealtimeSettings::default()
    }
}

/// Server-side JSON record of a message
pub fn message_json(id: &str, from: &str, to: &str, body: &str) -> Value {
    let sender_role = if from == OWNER_ID { "owner" } else { "employee" };
    json!({
        "id": id,
        "senderId": from,
        "senderRole": sender_role,
        "recipientId": to,
        "message": body,
        "messageType": "text",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "status": "sent"
    })
}

/// Domain message as the history API would return it
pub fn history_message(id: &str, from: &str, to: &str, body: &str, minutes_ago: i64) -> Message {
    let mut record: Value = message_json(id, from, to, body);
    record["timestamp"] = json!((chrono::Utc::now() - chrono::Duration::minutes(minutes_ago)).to_rfc3339());
    let record: dashboard_chat::application::dto::MessageRecord =
        serde_json::from_value(record).expect("valid message record");
    record.into()
}

/// Next update matching `pick`, waiting at most one second
pub async fn next_update<T>(
    updates: &mut tokio::sync::broadcast::Receiver<ChatUpdate>,
    pick: impl Fn(ChatUpdate) -> Option<T>,
) -> T {
    let wait = async {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if let Some(found) = pick(update) {
                        return found;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("update stream ended: {}", e),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(1), wait)
        .await
        .expect("no matching update")
}
