//! Conversation aggregate and history repository trait.
//!
//! A conversation is everything exchanged with one peer: the ordered
//! [`Timeline`] plus the derived [`ConversationSummary`] shown in lists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::message::{Message, MessageKind};
use super::session::Role;
use crate::domain::value_objects::MessageId;
use crate::shared::error::HistoryError;

/// Per-peer aggregate shown in conversation lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub peer_id: String,
    pub peer_role: Role,
    pub last_message: String,
    pub last_message_kind: MessageKind,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub online: bool,
}

impl ConversationSummary {
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            peer_role: Role::Unknown,
            last_message: String::new(),
            last_message_kind: MessageKind::Text,
            last_message_time: None,
            unread_count: 0,
            online: false,
        }
    }

    /// Take preview fields from `message`.
    pub fn record_message(&mut self, message: &Message) {
        self.last_message = message.body.clone();
        self.last_message_kind = message.kind;
        self.last_message_time = Some(message.created_at);
    }
}

/// Messages with one peer, in arrival order.
///
/// Reconciliation updates entries in place; nothing here reorders existing
/// entries by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    messages: Vec<Message>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    pub fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    pub fn contains_server_id(&self, server_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.id.server_id() == Some(server_id))
    }

    /// Earliest unconfirmed, non-failed entry with this sender and body.
    pub fn find_pending(&self, sender_id: &str, body: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.is_pending() && !m.failed && m.sender_id == sender_id && m.body == body)
    }

    pub fn remove(&mut self, index: usize) -> Message {
        self.messages.remove(index)
    }

    /// Replace the entry at `index`, returning the old one.
    pub fn replace(&mut self, index: usize, message: Message) -> Message {
        std::mem::replace(&mut self.messages[index], message)
    }

    /// Replace the timeline with a freshly fetched page.
    ///
    /// Unconfirmed local entries survive at the tail, as do confirmed entries
    /// that arrived after the newest message of the page.
    pub fn replace_with_page(&mut self, page: Vec<Message>) {
        let page_ids: HashSet<String> = page
            .iter()
            .filter_map(|m| m.id.server_id().map(str::to_owned))
            .collect();
        let newest = page.iter().map(|m| m.created_at).max();

        let survivors: Vec<Message> = std::mem::take(&mut self.messages)
            .into_iter()
            .filter(|m| match m.id.server_id() {
                None => true,
                Some(id) => {
                    !page_ids.contains(id) && newest.map(|t| m.created_at > t).unwrap_or(true)
                }
            })
            .collect();

        self.messages = dedup_by_server_id(page);
        self.messages.extend(survivors);
    }

    /// Prepend an older page, skipping entries already present.
    pub fn prepend_older(&mut self, page: Vec<Message>) -> usize {
        let fresh: Vec<Message> = dedup_by_server_id(page)
            .into_iter()
            .filter(|m| match m.id.server_id() {
                Some(id) => !self.contains_server_id(id),
                None => false,
            })
            .collect();

        let added = fresh.len();
        self.messages.splice(0..0, fresh);
        added
    }

    /// Mark the confirmed message `server_id` as read.
    pub fn mark_read(&mut self, server_id: &str, at: Option<DateTime<Utc>>) -> bool {
        self.messages
            .iter_mut()
            .find(|m| m.id.server_id() == Some(server_id))
            .map(|m| m.mark_read(at))
            .unwrap_or(false)
    }
}

fn dedup_by_server_id(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|m| match m.id.server_id() {
            Some(id) => seen.insert(id.to_owned()),
            None => true,
        })
        .collect()
}

/// One page of message history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Remote source of message history and conversation summaries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatHistoryRepository: Send + Sync {
    /// Fetch one page of history with `peer_id`.
    async fn fetch_history(
        &self,
        peer_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError>;

    /// Fetch the server's view of every conversation.
    async fn fetch_conversation_summaries(&self) -> Result<Vec<ConversationSummary>, HistoryError>;

    /// Mark everything from `peer_id` as read.
    async fn mark_read(&self, peer_id: &str) -> Result<(), HistoryError>;

    /// Total unread messages across conversations.
    async fn unread_count(&self) -> Result<u32, HistoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AuthenticatedSession, DeliveryStatus};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn me() -> AuthenticatedSession {
        AuthenticatedSession::new("owner-1", Role::Owner, "token")
    }

    fn server_message(id: &str, body: &str, minutes: i64) -> Message {
        let mut msg = Message::optimistic(&me(), "emp-1", body, MessageKind::Text);
        msg.id = MessageId::server(id);
        msg.created_at = Utc::now() - Duration::minutes(100) + Duration::minutes(minutes);
        msg.status = DeliveryStatus::Delivered;
        msg
    }

    fn ids(timeline: &Timeline) -> Vec<String> {
        timeline.messages().iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn test_find_pending_picks_earliest_match() {
        let mut timeline = Timeline::new();
        let first = Message::optimistic(&me(), "emp-1", "ok", MessageKind::Text);
        let second = Message::optimistic(&me(), "emp-1", "ok", MessageKind::Text);
        let first_id = first.id.clone();
        timeline.push(first);
        timeline.push(second);

        let index = timeline.find_pending("owner-1", "ok").unwrap();
        assert_eq!(timeline.messages()[index].id, first_id);
    }

    #[test]
    fn test_find_pending_skips_failed_entries() {
        let mut timeline = Timeline::new();
        let mut failed = Message::optimistic(&me(), "emp-1", "ok", MessageKind::Text);
        failed.failed = true;
        timeline.push(failed);

        assert_eq!(timeline.find_pending("owner-1", "ok"), None);
    }

    #[test]
    fn test_replace_with_page_keeps_pending_tail() {
        let mut timeline = Timeline::new();
        timeline.push(server_message("old", "stale", 1));
        let pending = Message::optimistic(&me(), "emp-1", "typing this", MessageKind::Text);
        let pending_id = pending.id.to_string();
        timeline.push(pending);

        timeline.replace_with_page(vec![server_message("a", "one", 2), server_message("b", "two", 3)]);

        assert_eq!(ids(&timeline), vec!["a".to_string(), "b".to_string(), pending_id]);
    }

    #[test]
    fn test_replace_with_page_keeps_newer_live_messages() {
        let mut timeline = Timeline::new();
        timeline.push(server_message("live", "arrived during fetch", 50));

        timeline.replace_with_page(vec![server_message("a", "one", 2)]);

        assert_eq!(ids(&timeline), vec!["a", "live"]);
    }

    #[test]
    fn test_prepend_older_skips_duplicates() {
        let mut timeline = Timeline::new();
        timeline.push(server_message("b", "two", 3));

        let added = timeline.prepend_older(vec![server_message("a", "one", 2), server_message("b", "two", 3)]);

        assert_eq!(added, 1);
        assert_eq!(ids(&timeline), vec!["a", "b"]);
    }

    #[test]
    fn test_mark_read_by_server_id() {
        let mut timeline = Timeline::new();
        timeline.push(server_message("a", "one", 2));

        assert!(timeline.mark_read("a", None));
        assert_eq!(timeline.messages()[0].status, DeliveryStatus::Read);
        assert!(!timeline.mark_read("missing", None));
    }
}
