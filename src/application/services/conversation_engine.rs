//! Conversation Engine
//!
//! Per-peer timelines, the derived conversation summaries, and the transient
//! typing and presence state. Every operation runs to completion against
//! in-memory state; emissions are fire-and-forget through an [`EventSink`].
//!
//! Work the engine cannot finish synchronously is left in its [`Outbox`]:
//! UI notifications and REST read receipts. The async facade drains it after
//! each call.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use validator::Validate;

use crate::application::dto::SendMessageRequest;
use crate::config::ChatSettings;
use crate::domain::{
    ConversationSummary, Message, MessageId, MessageKind, Role, SessionProvider, Timeline,
};
use crate::infrastructure::cache::{PresenceCache, TypingCache};
use crate::infrastructure::metrics;
use crate::infrastructure::realtime::events::{MessageReadPayload, PresencePayload, TypingPayload};
use crate::infrastructure::realtime::{
    ConnectionState, ConnectionStatus, EventSink, InboundEvent, OutboundEvent,
};
use crate::shared::error::ChatError;
use crate::shared::validation::validation_error;

/// Timer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Idle window after the last keystroke before `typing_stop` is emitted
    pub typing_idle: Duration,
    /// How long a peer's typing flag lives without an explicit stop
    pub typing_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&ChatSettings::default())
    }
}

impl From<&ChatSettings> for EngineConfig {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            typing_idle: Duration::from_millis(settings.typing_idle_ms),
            typing_timeout: Duration::from_millis(settings.typing_timeout_ms),
        }
    }
}

/// Change notifications for read-only observers
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    TimelineChanged {
        peer_id: String,
    },
    ConversationChanged {
        peer_id: String,
    },
    TypingChanged {
        peer_id: String,
        typing: bool,
    },
    PresenceChanged {
        peer_id: String,
        online: bool,
    },
    /// The server refused a send. Identifies the optimistic entry when one
    /// was in flight.
    SendFailed {
        peer_id: Option<String>,
        message_id: Option<MessageId>,
        reason: String,
    },
    ConnectionChanged(ConnectionState),
    /// A background operation failed
    Error {
        context: String,
        message: String,
    },
}

/// Pending side effects produced by engine calls
#[derive(Debug, Default, PartialEq)]
pub struct Outbox {
    pub updates: Vec<ChatUpdate>,
    /// Peers whose conversation must be marked read on the server
    pub read_receipts: Vec<String>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.read_receipts.is_empty()
    }
}

/// An emitted send awaiting its `message_sent` or `message_error`
#[derive(Debug, Clone)]
struct InFlight {
    peer_id: String,
    id: MessageId,
}

pub struct ConversationEngine {
    sessions: Arc<dyn SessionProvider>,
    sink: Arc<dyn EventSink>,
    timelines: HashMap<String, Timeline>,
    conversations: HashMap<String, ConversationSummary>,
    presence: PresenceCache,
    remote_typing: TypingCache,
    local_typing: TypingCache,
    in_flight: VecDeque<InFlight>,
    open_peer: Option<String>,
    connection: ConnectionStatus,
    outbox: Outbox,
}

impl ConversationEngine {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        sink: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions,
            sink,
            timelines: HashMap::new(),
            conversations: HashMap::new(),
            presence: PresenceCache::new(),
            remote_typing: TypingCache::with_ttl(config.typing_timeout),
            local_typing: TypingCache::with_ttl(config.typing_idle),
            in_flight: VecDeque::new(),
            open_peer: None,
            connection: ConnectionStatus::Disconnected,
            outbox: Outbox::default(),
        }
    }

    // --- Conversations ---

    /// Make `peer_id` the actively viewed conversation.
    pub fn open_conversation(&mut self, peer_id: &str) {
        self.ensure_conversation(peer_id);
        self.open_peer = Some(peer_id.to_string());
        tracing::debug!(peer_id = %peer_id, "Conversation opened");
    }

    pub fn close_conversation(&mut self) {
        if let Some(peer_id) = self.open_peer.take() {
            tracing::debug!(peer_id = %peer_id, "Conversation closed");
        }
    }

    /// Merge a fetched history page into the peer's timeline.
    ///
    /// Page 1 replaces the timeline (unconfirmed sends survive at the tail);
    /// later pages prepend older messages.
    pub fn apply_history(&mut self, peer_id: &str, page: u32, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.created_at);
        let count = messages.len();

        let timeline = self.timelines.entry(peer_id.to_string()).or_default();
        if page <= 1 {
            timeline.replace_with_page(messages);
        } else {
            let added = timeline.prepend_older(messages);
            tracing::debug!(peer_id = %peer_id, page, added, "Prepended older history");
        }

        self.ensure_conversation(peer_id);
        self.refresh_preview(peer_id);
        tracing::debug!(peer_id = %peer_id, page, count, "History applied");

        self.push(ChatUpdate::TimelineChanged {
            peer_id: peer_id.to_string(),
        });
        self.push(ChatUpdate::ConversationChanged {
            peer_id: peer_id.to_string(),
        });
    }

    /// Merge the server's conversation list into local summaries.
    pub fn apply_summaries(&mut self, summaries: Vec<ConversationSummary>) {
        for mut summary in summaries {
            let peer_id = summary.peer_id.clone();
            summary.online = self.presence.is_online(&peer_id);

            if let Some(local) = self.conversations.get(&peer_id) {
                // Keep a preview that is newer than the server's snapshot
                if local.last_message_time > summary.last_message_time {
                    summary.last_message = local.last_message.clone();
                    summary.last_message_kind = local.last_message_kind;
                    summary.last_message_time = local.last_message_time;
                }
            }
            if self.open_peer.as_deref() == Some(peer_id.as_str()) {
                summary.unread_count = 0;
            }

            self.conversations.insert(peer_id.clone(), summary);
            self.push(ChatUpdate::ConversationChanged { peer_id });
        }
    }

    // --- Sending ---

    /// Optimistically append a message and emit it when connected.
    ///
    /// Returns the local id of the optimistic entry. While disconnected the
    /// entry stays unconfirmed and nothing is queued for later.
    pub fn send_message(
        &mut self,
        peer_id: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<MessageId, ChatError> {
        let request = SendMessageRequest::new(peer_id, body, kind);
        request.validate().map_err(validation_error)?;

        let me = self
            .sessions
            .current_session()
            .ok_or(ChatError::NotAuthenticated)?;

        let message = Message::optimistic(&me, &request.recipient_id, &request.body, kind);
        let id = message.id.clone();
        let peer_id = request.recipient_id;

        self.ensure_conversation(&peer_id);
        if let Some(summary) = self.conversations.get_mut(&peer_id) {
            summary.record_message(&message);
        }
        self.timelines
            .entry(peer_id.clone())
            .or_default()
            .push(message);

        let emitted = self.sink.is_connected()
            && self.emit(OutboundEvent::private_message(&peer_id, &request.body, kind));

        if emitted {
            self.in_flight.push_back(InFlight {
                peer_id: peer_id.clone(),
                id: id.clone(),
            });
            self.local_typing.clear(&peer_id);
            self.emit(OutboundEvent::typing_stop(&peer_id));
            tracing::debug!(peer_id = %peer_id, local_id = %id, "Message emitted");
        } else {
            tracing::info!(peer_id = %peer_id, local_id = %id, "Not connected, message kept local");
        }
        metrics::record_message_sent(emitted);

        self.push(ChatUpdate::TimelineChanged {
            peer_id: peer_id.clone(),
        });
        self.push(ChatUpdate::ConversationChanged { peer_id });

        Ok(id)
    }

    // --- Reading ---

    /// Reset the peer's unread counter and queue a server read receipt.
    pub fn mark_read(&mut self, peer_id: &str) -> Result<(), ChatError> {
        if !self.knows(peer_id) {
            return Err(ChatError::UnknownPeer(peer_id.to_string()));
        }

        if let Some(summary) = self.conversations.get_mut(peer_id) {
            if summary.unread_count != 0 {
                summary.unread_count = 0;
                self.outbox.updates.push(ChatUpdate::ConversationChanged {
                    peer_id: peer_id.to_string(),
                });
            }
        }
        self.outbox.read_receipts.push(peer_id.to_string());
        Ok(())
    }

    // --- Typing ---

    /// Signal that the user is typing to `peer_id`.
    ///
    /// Emits `typing_start` only when not already typing to that peer; every
    /// call pushes the automatic `typing_stop` further out.
    pub fn start_typing(&mut self, peer_id: &str, now: Instant) {
        if peer_id.is_empty() || !self.sink.is_connected() {
            return;
        }
        if self.local_typing.arm(peer_id, now) && !self.emit(OutboundEvent::typing_start(peer_id)) {
            self.local_typing.clear(peer_id);
        }
    }

    pub fn stop_typing(&mut self, peer_id: &str) {
        if self.local_typing.clear(peer_id) && self.sink.is_connected() {
            self.emit(OutboundEvent::typing_stop(peer_id));
        }
    }

    // --- Timers ---

    /// Earliest pending typing deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.remote_typing.next_deadline(), self.local_typing.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every deadline at or before `now`.
    pub fn expire_timers(&mut self, now: Instant) {
        for peer_id in self.remote_typing.expire(now) {
            tracing::debug!(peer_id = %peer_id, "Typing indicator timed out");
            self.push(ChatUpdate::TypingChanged {
                peer_id,
                typing: false,
            });
        }

        let idle = self.local_typing.expire(now);
        if self.sink.is_connected() {
            for peer_id in idle {
                self.emit(OutboundEvent::typing_stop(&peer_id));
            }
        }
    }

    // --- Inbound events ---

    pub fn handle_event(&mut self, event: InboundEvent, now: Instant) {
        match event {
            InboundEvent::ConnectionConfirmed(payload) => {
                tracing::info!(
                    user_id = ?payload.user_id,
                    message = ?payload.message,
                    "Connection confirmed by server"
                );
            }
            InboundEvent::UserOnline(PresencePayload { user_id }) => self.set_presence(&user_id, true),
            InboundEvent::UserOffline(PresencePayload { user_id }) => {
                self.set_presence(&user_id, false)
            }
            InboundEvent::NewMessage(message) => self.receive_message(message),
            InboundEvent::MessageSent(message) => self.confirm_sent(message),
            InboundEvent::MessageError(payload) => self.fail_in_flight(payload.error),
            InboundEvent::MessageRead(payload) | InboundEvent::MessageReadConfirmation(payload) => {
                self.apply_read(payload)
            }
            InboundEvent::UserTyping(TypingPayload { user_id }) => {
                if self.remote_typing.arm(&user_id, now) {
                    self.push(ChatUpdate::TypingChanged {
                        peer_id: user_id,
                        typing: true,
                    });
                }
            }
            InboundEvent::UserStoppedTyping(TypingPayload { user_id }) => {
                if self.remote_typing.clear(&user_id) {
                    self.push(ChatUpdate::TypingChanged {
                        peer_id: user_id,
                        typing: false,
                    });
                }
            }
            InboundEvent::Pong => tracing::trace!("Pong"),
        }
    }

    fn receive_message(&mut self, message: Message) {
        let Some(me) = self.sessions.current_session() else {
            tracing::debug!("Dropping message received without a session");
            return;
        };

        let peer_id = message.counterpart(&me.user_id).to_string();
        let from_peer = message.sender_id != me.user_id;

        let timeline = self.timelines.entry(peer_id.clone()).or_default();
        if let Some(server_id) = message.id.server_id() {
            if timeline.contains_server_id(server_id) {
                tracing::debug!(peer_id = %peer_id, message_id = %server_id, "Duplicate message ignored");
                return;
            }
        }
        let server_id = message.id.server_id().map(str::to_owned);
        timeline.push(message);

        self.ensure_conversation(&peer_id);
        self.refresh_preview(&peer_id);

        if from_peer {
            if self.open_peer.as_deref() == Some(peer_id.as_str()) {
                if let (Some(id), true) = (server_id, self.sink.is_connected()) {
                    self.emit(OutboundEvent::message_read(&id));
                }
                self.outbox.read_receipts.push(peer_id.clone());
            } else if let Some(summary) = self.conversations.get_mut(&peer_id) {
                summary.unread_count += 1;
            }

            // A delivered message ends the peer's typing burst
            if self.remote_typing.clear(&peer_id) {
                self.push(ChatUpdate::TypingChanged {
                    peer_id: peer_id.clone(),
                    typing: false,
                });
            }
        }

        self.push(ChatUpdate::TimelineChanged {
            peer_id: peer_id.clone(),
        });
        self.push(ChatUpdate::ConversationChanged { peer_id });
    }

    /// Reconcile the server's record of one of our own sends.
    ///
    /// Echoes already flagged as failed are never matched. When a history
    /// reload already brought in the server copy, the matching echo is
    /// dropped rather than turned into a second copy.
    fn confirm_sent(&mut self, confirmed: Message) {
        let Some(me) = self.sessions.current_session() else {
            return;
        };
        if confirmed.sender_id != me.user_id {
            tracing::debug!(sender_id = %confirmed.sender_id, "Ignoring confirmation for another sender");
            return;
        }

        let peer_id = confirmed.recipient_id.clone();
        let timeline = self.timelines.entry(peer_id.clone()).or_default();
        let pending = timeline.find_pending(&confirmed.sender_id, &confirmed.body);
        let known = timeline.position(&confirmed.id).is_some();

        let rule = match (pending, known) {
            (Some(index), false) => {
                let optimistic = timeline.replace(index, confirmed);
                self.in_flight.retain(|f| f.id != optimistic.id);
                "replaced"
            }
            (Some(index), true) => {
                let optimistic = timeline.remove(index);
                self.in_flight.retain(|f| f.id != optimistic.id);
                if let Some(existing) = timeline.get_mut(&confirmed.id) {
                    existing.advance_status(confirmed.status);
                }
                "merged"
            }
            (None, true) => {
                if let Some(existing) = timeline.get_mut(&confirmed.id) {
                    existing.advance_status(confirmed.status);
                }
                "status_updated"
            }
            (None, false) => {
                timeline.push(confirmed);
                "appended"
            }
        };

        metrics::record_reconciliation(rule);
        tracing::debug!(peer_id = %peer_id, rule, "Send confirmed");

        self.ensure_conversation(&peer_id);
        self.refresh_preview(&peer_id);
        self.push(ChatUpdate::TimelineChanged {
            peer_id: peer_id.clone(),
        });
        self.push(ChatUpdate::ConversationChanged { peer_id });
    }

    /// The server refused the most recent in-flight send.
    fn fail_in_flight(&mut self, reason: String) {
        metrics::record_send_error();

        let Some(failed) = self.in_flight.pop_back() else {
            tracing::warn!(reason = %reason, "Send error with nothing in flight");
            self.push(ChatUpdate::SendFailed {
                peer_id: None,
                message_id: None,
                reason,
            });
            return;
        };

        tracing::warn!(peer_id = %failed.peer_id, local_id = %failed.id, reason = %reason, "Send failed");

        if let Some(message) = self
            .timelines
            .get_mut(&failed.peer_id)
            .and_then(|t| t.get_mut(&failed.id))
        {
            message.failed = true;
        }

        self.push(ChatUpdate::TimelineChanged {
            peer_id: failed.peer_id.clone(),
        });
        self.push(ChatUpdate::SendFailed {
            peer_id: Some(failed.peer_id),
            message_id: Some(failed.id),
            reason,
        });
    }

    fn apply_read(&mut self, payload: MessageReadPayload) {
        let read_at: Option<DateTime<Utc>> = payload.read_at;
        let peer_id = self
            .timelines
            .iter_mut()
            .find(|(_, timeline)| timeline.contains_server_id(&payload.message_id))
            .and_then(|(peer_id, timeline)| {
                timeline
                    .mark_read(&payload.message_id, read_at)
                    .then(|| peer_id.clone())
            });

        if let Some(peer_id) = peer_id {
            self.push(ChatUpdate::TimelineChanged { peer_id });
        }
    }

    fn set_presence(&mut self, peer_id: &str, online: bool) {
        let changed = if online {
            self.presence.mark_online(peer_id)
        } else {
            self.presence.mark_offline(peer_id)
        };
        if !changed {
            return;
        }

        if let Some(summary) = self.conversations.get_mut(peer_id) {
            summary.online = online;
            self.outbox.updates.push(ChatUpdate::ConversationChanged {
                peer_id: peer_id.to_string(),
            });
        }
        if !online && self.remote_typing.clear(peer_id) {
            self.push(ChatUpdate::TypingChanged {
                peer_id: peer_id.to_string(),
                typing: false,
            });
        }
        self.push(ChatUpdate::PresenceChanged {
            peer_id: peer_id.to_string(),
            online,
        });
    }

    // --- Connection lifecycle ---

    /// Record a connection state change. Any state other than `Connected`
    /// drops what only live events can rebuild.
    pub fn connection_changed(&mut self, state: ConnectionState) {
        self.connection = state.status;

        if state.status != ConnectionStatus::Connected {
            self.on_connection_lost();
        }
        self.push(ChatUpdate::ConnectionChanged(state));
    }

    /// Forget presence, typing and in-flight sends.
    pub fn on_connection_lost(&mut self) {
        for peer_id in self.presence.clear() {
            if let Some(summary) = self.conversations.get_mut(&peer_id) {
                summary.online = false;
                self.outbox.updates.push(ChatUpdate::ConversationChanged {
                    peer_id: peer_id.clone(),
                });
            }
            self.push(ChatUpdate::PresenceChanged {
                peer_id,
                online: false,
            });
        }
        for peer_id in self.remote_typing.clear_all() {
            self.push(ChatUpdate::TypingChanged {
                peer_id,
                typing: false,
            });
        }
        self.local_typing.clear_all();

        if !self.in_flight.is_empty() {
            tracing::info!(count = self.in_flight.len(), "Unconfirmed sends left as sent");
            self.in_flight.clear();
        }
    }

    /// Drop all conversation state (logout).
    pub fn reset(&mut self) {
        self.timelines.clear();
        self.conversations.clear();
        self.presence.clear();
        self.remote_typing.clear_all();
        self.local_typing.clear_all();
        self.in_flight.clear();
        self.open_peer = None;
        self.outbox = Outbox::default();
    }

    pub fn drain_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }

    // --- Queries ---

    pub fn timeline(&self, peer_id: &str) -> Option<&Timeline> {
        self.timelines.get(peer_id)
    }

    pub fn conversation(&self, peer_id: &str) -> Option<&ConversationSummary> {
        self.conversations.get(peer_id)
    }

    /// Summaries, most recent activity first
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        let mut list: Vec<ConversationSummary> = self.conversations.values().cloned().collect();
        list.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        list
    }

    pub fn is_online(&self, peer_id: &str) -> bool {
        self.presence.is_online(peer_id)
    }

    pub fn is_typing(&self, peer_id: &str) -> bool {
        self.remote_typing.is_active(peer_id)
    }

    pub fn online_peers(&self) -> Vec<String> {
        self.presence.online_peers()
    }

    /// Peers currently shown as typing, sorted
    pub fn typing_peers(&self) -> Vec<String> {
        self.remote_typing.active_peers()
    }

    pub fn timelines(&self) -> impl Iterator<Item = (&str, &Timeline)> {
        self.timelines.iter().map(|(peer_id, t)| (peer_id.as_str(), t))
    }

    pub fn open_peer(&self) -> Option<&str> {
        self.open_peer.as_deref()
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations.values().map(|c| c.unread_count).sum()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection
    }

    // --- Helpers ---

    fn knows(&self, peer_id: &str) -> bool {
        self.conversations.contains_key(peer_id) || self.timelines.contains_key(peer_id)
    }

    fn ensure_conversation(&mut self, peer_id: &str) {
        if !self.conversations.contains_key(peer_id) {
            let mut summary = ConversationSummary::new(peer_id);
            summary.online = self.presence.is_online(peer_id);
            self.conversations.insert(peer_id.to_string(), summary);
        }
        self.timelines.entry(peer_id.to_string()).or_default();
    }

    /// Refresh the summary preview from the timeline's last entry.
    fn refresh_preview(&mut self, peer_id: &str) {
        let last = self.timelines.get(peer_id).and_then(|t| t.last());
        if let (Some(last), Some(summary)) = (last, self.conversations.get_mut(peer_id)) {
            summary.record_message(last);
            if summary.peer_role == Role::Unknown && last.sender_id == peer_id {
                summary.peer_role = last.sender_role;
            }
        }
    }

    fn emit(&self, event: OutboundEvent) -> bool {
        let name = event.event_name();
        match self.sink.emit(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(event = name, error = %e, "Emit failed");
                false
            }
        }
    }

    fn push(&mut self, update: ChatUpdate) {
        self.outbox.updates.push(update);
    }
}
