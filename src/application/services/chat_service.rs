//! Chat Service
//!
//! [`ChatClient`] is the async face of the chat core. It owns the
//! [`ConversationEngine`], feeds it inbound events, connection changes and
//! timer deadlines from one driver task, and carries out the REST side
//! effects the engine asks for.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, watch, Notify};
use tokio::time::Instant;

use super::conversation_engine::{ChatUpdate, ConversationEngine, EngineConfig};
use crate::config::ChatSettings;
use crate::domain::{
    ChatHistoryRepository, ConversationSummary, Message, MessageId, MessageKind, SessionProvider,
};
use crate::infrastructure::cache::SessionStore;
use crate::infrastructure::realtime::{
    ConnectionManager, ConnectionState, EventSink, InboundEvent,
};
use crate::shared::error::ChatError;

/// Read-only snapshot of the chat state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatView {
    /// Most recent activity first
    pub conversations: Vec<ConversationSummary>,
    pub timelines: HashMap<String, Vec<Message>>,
    pub online: Vec<String>,
    pub typing: Vec<String>,
    pub open_peer: Option<String>,
    pub total_unread: u32,
    pub connection: ConnectionState,
}

impl ChatView {
    pub fn timeline(&self, peer_id: &str) -> &[Message] {
        self.timelines
            .get(peer_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn conversation(&self, peer_id: &str) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|c| c.peer_id == peer_id)
    }

    pub fn is_online(&self, peer_id: &str) -> bool {
        self.online.iter().any(|p| p == peer_id)
    }

    pub fn is_typing(&self, peer_id: &str) -> bool {
        self.typing.iter().any(|p| p == peer_id)
    }
}

struct Inner {
    engine: RwLock<ConversationEngine>,
    connection: Arc<ConnectionManager>,
    history: Arc<dyn ChatHistoryRepository>,
    sessions: Arc<SessionStore>,
    updates: broadcast::Sender<ChatUpdate>,
    /// Wakes the driver when a call may have moved the next deadline
    wake: Notify,
    page_size: u32,
}

impl Inner {
    /// Run `f` against the engine, then carry out what it left behind.
    fn apply<R>(self: &Arc<Self>, f: impl FnOnce(&mut ConversationEngine) -> R) -> R {
        let (result, outbox) = {
            let mut engine = self.engine.write();
            let result = f(&mut engine);
            (result, engine.drain_outbox())
        };

        for update in outbox.updates {
            // No receivers is fine
            let _ = self.updates.send(update);
        }
        for peer_id in outbox.read_receipts {
            self.send_read_receipt(peer_id);
        }
        self.wake.notify_one();

        result
    }

    fn send_read_receipt(self: &Arc<Self>, peer_id: String) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner.history.mark_read(&peer_id).await {
                Ok(()) => tracing::debug!(peer_id = %peer_id, "Read receipt delivered"),
                Err(e) => {
                    tracing::warn!(peer_id = %peer_id, error = %e, "Read receipt failed");
                    let _ = inner.updates.send(ChatUpdate::Error {
                        context: format!("mark_read:{}", peer_id),
                        message: e.to_string(),
                    });
                }
            }
        });
    }
}

/// Async chat client
pub struct ChatClient {
    inner: Arc<Inner>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ChatClient {
    /// Build the client and spawn its driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        settings: &ChatSettings,
        connection: Arc<ConnectionManager>,
        history: Arc<dyn ChatHistoryRepository>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let channel = connection.channel();
        let events = channel.subscribe();
        let states = connection.watch();

        let sink: Arc<dyn EventSink> = Arc::new(channel);
        let provider: Arc<dyn SessionProvider> = sessions.clone();
        let engine = ConversationEngine::new(provider, sink, EngineConfig::from(settings));

        let (updates, _) = broadcast::channel(settings.update_buffer);
        let inner = Arc::new(Inner {
            engine: RwLock::new(engine),
            connection,
            history,
            sessions,
            updates,
            wake: Notify::new(),
            page_size: settings.history_page_size,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(drive(Arc::clone(&inner), events, states, shutdown_rx));

        Self {
            inner,
            shutdown: Some(shutdown_tx),
        }
    }

    // --- Connection ---

    pub async fn connect(&self) -> Result<(), ChatError> {
        self.inner.connection.connect().await?;
        Ok(())
    }

    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Clear the session, close the connection and drop all chat state.
    pub fn logout(&self) {
        if let Some(session) = self.inner.sessions.logout() {
            tracing::info!(user_id = %session.user_id, "Logging out");
        }
        self.inner.connection.disconnect();
        self.inner.apply(|engine| engine.reset());
    }

    // --- History ---

    /// Fetch the conversation list and merge it into the summaries.
    pub async fn load_conversations(&self) -> Result<usize, ChatError> {
        let summaries = self.inner.history.fetch_conversation_summaries().await?;
        let count = summaries.len();
        self.inner.apply(|engine| engine.apply_summaries(summaries));

        tracing::debug!(count, "Conversations loaded");
        Ok(count)
    }

    /// Fetch one history page, merge it, then mark the conversation read.
    ///
    /// On error the timeline is left as it was.
    pub async fn load_history(&self, peer_id: &str, page: u32, page_size: u32) -> Result<(), ChatError> {
        let fetched = self
            .inner
            .history
            .fetch_history(peer_id, page, page_size)
            .await?;

        tracing::debug!(
            peer_id = %peer_id,
            page,
            count = fetched.messages.len(),
            total = fetched.total,
            "History loaded"
        );

        self.inner.apply(|engine| {
            engine.apply_history(peer_id, page, fetched.messages);
            engine.mark_read(peer_id)
        })
    }

    /// Open a conversation and load its latest page.
    pub async fn open_conversation(&self, peer_id: &str) -> Result<(), ChatError> {
        self.inner.apply(|engine| engine.open_conversation(peer_id));
        self.load_history(peer_id, 1, self.inner.page_size).await
    }

    pub fn close_conversation(&self) {
        self.inner.apply(|engine| engine.close_conversation());
    }

    /// Server-side unread total across all conversations.
    pub async fn refresh_unread_total(&self) -> Result<u32, ChatError> {
        Ok(self.inner.history.unread_count().await?)
    }

    // --- Engine operations ---

    pub fn send_message(&self, peer_id: &str, body: &str, kind: MessageKind) -> Result<MessageId, ChatError> {
        self.inner
            .apply(|engine| engine.send_message(peer_id, body, kind))
    }

    pub fn mark_read(&self, peer_id: &str) -> Result<(), ChatError> {
        self.inner.apply(|engine| engine.mark_read(peer_id))
    }

    pub fn start_typing(&self, peer_id: &str) {
        self.inner
            .apply(|engine| engine.start_typing(peer_id, Instant::now()));
    }

    pub fn stop_typing(&self, peer_id: &str) {
        self.inner.apply(|engine| engine.stop_typing(peer_id));
    }

    // --- Observation ---

    pub fn view(&self) -> ChatView {
        let engine = self.inner.engine.read();
        ChatView {
            conversations: engine.conversations(),
            timelines: engine
                .timelines()
                .map(|(peer_id, timeline)| (peer_id.to_string(), timeline.messages().to_vec()))
                .collect(),
            online: engine.online_peers(),
            typing: engine.typing_peers(),
            open_peer: engine.open_peer().map(str::to_owned),
            total_unread: engine.total_unread(),
            connection: self.inner.connection.state(),
        }
    }

    pub fn updates(&self) -> broadcast::Receiver<ChatUpdate> {
        self.inner.updates.subscribe()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Driver loop: inbound events, connection changes and timers, in order.
async fn drive(
    inner: Arc<Inner>,
    mut events: broadcast::Receiver<InboundEvent>,
    mut states: watch::Receiver<ConnectionState>,
    mut shutdown: oneshot::Receiver<()>,
) {
    tracing::debug!("Chat driver started");

    loop {
        let deadline = inner.engine.read().next_deadline();

        tokio::select! {
            _ = &mut shutdown => break,

            event = events.recv() => match event {
                Ok(event) => {
                    inner.apply(|engine| engine.handle_event(event, Instant::now()));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Chat driver lagged behind inbound events");
                    let _ = inner.updates.send(ChatUpdate::Error {
                        context: "events".to_string(),
                        message: format!("{} events skipped", skipped),
                    });
                }
                Err(RecvError::Closed) => break,
            },

            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                tracing::debug!(status = %state.status, "Connection state changed");
                inner.apply(|engine| engine.connection_changed(state));
            }

            _ = sleep_until(deadline) => {
                inner.apply(|engine| engine.expire_timers(Instant::now()));
            }

            _ = inner.wake.notified() => {}
        }
    }

    tracing::debug!("Chat driver stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
