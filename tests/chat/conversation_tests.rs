//! Conversation flow tests

use std::time::Duration;

use dashboard_chat::application::services::ChatUpdate;
use dashboard_chat::domain::{ConversationSummary, DeliveryStatus, MessageId, MessageKind};
use dashboard_chat::infrastructure::realtime::ConnectionStatus;
use dashboard_chat::shared::error::{ChatError, HistoryError};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{history_message, message_json, next_update, TestChat, OWNER_ID};

/// Test that opening a conversation loads the newest page and marks it read
#[tokio::test]
async fn test_open_conversation_loads_latest_page() {
    // Arrange
    let chat = TestChat::new();
    let messages = (0..60)
        .map(|i| history_message(&format!("srv-{:02}", i), "emp-1", OWNER_ID, &format!("m{}", i), 60 - i))
        .collect();
    chat.history.set_history("emp-1", messages);

    // Act
    chat.client.open_conversation("emp-1").await.unwrap();

    // Assert
    let view = chat.client.view();
    let timeline = view.timeline("emp-1");
    assert_eq!(timeline.len(), 50);
    assert_eq!(timeline[0].body, "m10");
    assert_eq!(timeline[49].body, "m59");
    assert_eq!(view.open_peer.as_deref(), Some("emp-1"));

    // Older page is prepended
    chat.client.load_history("emp-1", 2, 50).await.unwrap();
    let view = chat.client.view();
    assert_eq!(view.timeline("emp-1").len(), 60);
    assert_eq!(view.timeline("emp-1")[0].body, "m0");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(chat.history.read_calls(), vec!["emp-1".to_string(), "emp-1".to_string()]);
}

/// Test that a failed fetch is returned and changes nothing
#[tokio::test]
async fn test_history_failure_is_reported() {
    // Arrange
    let chat = TestChat::new();
    chat.history.fail_history_with(HistoryError::Unauthorized("Access denied".into()));

    // Act
    let error = chat.client.load_history("emp-1", 1, 50).await.unwrap_err();

    // Assert
    assert!(matches!(error, ChatError::History(HistoryError::Unauthorized(_))));
    assert!(error.requires_reauthentication());
    assert!(chat.client.view().timeline("emp-1").is_empty());
}

/// Test that messages for other conversations count as unread
#[tokio::test]
async fn test_unread_counts_until_marked_read() {
    // Arrange
    let mut chat = TestChat::new();
    let link = chat.connect().await;

    // Act
    link.emit("new_message", message_json("srv-1", "emp-2", OWNER_ID, "Shift swap?"));
    link.emit("new_message", message_json("srv-2", "emp-2", OWNER_ID, "Anyone?"));

    // Assert
    let view = chat
        .eventually(|v| v.conversation("emp-2").map(|c| c.unread_count) == Some(2))
        .await;
    assert_eq!(view.total_unread, 2);
    assert_eq!(view.conversation("emp-2").unwrap().last_message, "Anyone?");

    chat.client.mark_read("emp-2").unwrap();
    assert_eq!(chat.client.view().total_unread, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(chat.history.read_calls(), vec!["emp-2".to_string()]);
}

/// Test that a message in the open conversation is read on arrival
#[tokio::test]
async fn test_message_in_open_conversation_is_read() {
    // Arrange
    let mut chat = TestChat::new();
    let mut link = chat.connect().await;
    chat.client.open_conversation("emp-1").await.unwrap();

    // Act
    link.emit("new_message", message_json("srv-7", "emp-1", OWNER_ID, "Done"));

    // Assert
    let (name, payload) = link.next_event().await.unwrap();
    assert_eq!(name, "message_read");
    assert_eq!(payload, json!({ "messageId": "srv-7" }));

    let view = chat.eventually(|v| v.timeline("emp-1").len() == 1).await;
    assert_eq!(view.conversation("emp-1").unwrap().unread_count, 0);
}

/// Test the optimistic send and its reconciliation
#[tokio::test]
async fn test_send_is_reconciled_in_place() {
    // Arrange
    let mut chat = TestChat::new();
    let mut link = chat.connect().await;

    // Act
    let first = chat.client.send_message("emp-1", "on my way", MessageKind::Text).unwrap();
    let second = chat.client.send_message("emp-1", "ok", MessageKind::Text).unwrap();

    // Assert: echoes appear immediately
    let view = chat.client.view();
    let ids: Vec<MessageId> = view.timeline("emp-1").iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec![first, second.clone()]);

    let (name, payload) = link.next_event().await.unwrap();
    assert_eq!(name, "private_message");
    assert_eq!(payload["message"], "on my way");

    link.emit("message_sent", message_json("srv-1", OWNER_ID, "emp-1", "on my way"));

    let view = chat
        .eventually(|v| v.timeline("emp-1").first().map(|m| !m.is_pending()) == Some(true))
        .await;
    let ids: Vec<MessageId> = view.timeline("emp-1").iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec![MessageId::server("srv-1"), second]);
}

/// Test that a server-side send error flags the message
#[tokio::test]
async fn test_send_error_flags_message() {
    // Arrange
    let mut chat = TestChat::new();
    let link = chat.connect().await;
    let mut updates = chat.client.updates();

    // Act
    let id = chat.client.send_message("emp-9", "hello?", MessageKind::Text).unwrap();
    link.emit("message_error", json!({ "error": "Recipient not found" }));

    // Assert
    let (failed_id, reason) = next_update(&mut updates, |update| match update {
        ChatUpdate::SendFailed { message_id, reason, .. } => Some((message_id, reason)),
        _ => None,
    })
    .await;
    assert_eq!(failed_id, Some(id));
    assert_eq!(reason, "Recipient not found");

    let view = chat.client.view();
    assert!(view.timeline("emp-9")[0].failed);
    assert_eq!(view.connection.status, ConnectionStatus::Connected);
}

/// Test that read receipts from the peer update delivery status
#[tokio::test]
async fn test_peer_read_receipt_marks_message_read() {
    // Arrange
    let mut chat = TestChat::new();
    let link = chat.connect().await;
    chat.client.send_message("emp-1", "see you", MessageKind::Text).unwrap();
    link.emit("message_sent", message_json("srv-3", OWNER_ID, "emp-1", "see you"));
    chat.eventually(|v| v.timeline("emp-1").first().map(|m| m.id == MessageId::server("srv-3")) == Some(true))
        .await;

    // Act
    link.emit("message_read", json!({ "messageId": "srv-3", "readAt": "2024-05-01T10:00:00Z" }));

    // Assert
    let view = chat
        .eventually(|v| v.timeline("emp-1")[0].status == DeliveryStatus::Read)
        .await;
    assert!(view.timeline("emp-1")[0].read_at.is_some());
}

/// Test typing indicators in both directions
#[tokio::test]
async fn test_typing_round_trip() {
    // Arrange
    let mut chat = TestChat::new();
    let mut link = chat.connect().await;

    // Act: repeated keystrokes emit a single start
    chat.client.start_typing("emp-1");
    chat.client.start_typing("emp-1");
    chat.client.stop_typing("emp-1");

    // Assert
    let (name, payload) = link.next_event().await.unwrap();
    assert_eq!(name, "typing_start");
    assert_eq!(payload, json!({ "recipientId": "emp-1" }));
    let (name, _) = link.next_event().await.unwrap();
    assert_eq!(name, "typing_stop");

    link.emit("user_typing", json!({ "userId": "emp-1" }));
    chat.eventually(|v| v.is_typing("emp-1")).await;

    link.emit("user_stopped_typing", json!({ "userId": "emp-1" }));
    chat.eventually(|v| !v.is_typing("emp-1")).await;
}

/// Test presence tracking and its reset on disconnect
#[tokio::test]
async fn test_presence_follows_connection() {
    // Arrange
    let mut chat = TestChat::new();
    chat.history.set_summaries(vec![ConversationSummary::new("emp-4")]);
    chat.client.load_conversations().await.unwrap();
    let link = chat.connect().await;

    // Act
    link.emit("user_online", json!({ "userId": "emp-4" }));
    link.emit("user_online", json!({ "userId": "emp-5" }));
    link.emit("user_offline", json!({ "userId": "emp-5" }));

    // Assert
    let view = chat
        .eventually(|v| v.is_online("emp-4") && !v.is_online("emp-5"))
        .await;
    assert!(view.conversation("emp-4").unwrap().online);
    assert_eq!(view.online, vec!["emp-4".to_string()]);

    chat.client.disconnect();
    let view = chat.eventually(|v| v.online.is_empty()).await;
    assert!(!view.conversation("emp-4").unwrap().online);
}

/// Test that an offline send is kept locally and never resent
#[tokio::test]
async fn test_offline_send_is_not_resent() {
    // Arrange
    let mut chat = TestChat::new();
    let id = chat.client.send_message("emp-1", "later", MessageKind::Text).unwrap();

    // Act
    let mut link = chat.connect().await;

    // Assert
    let next = tokio::time::timeout(Duration::from_millis(100), link.next_event()).await;
    assert!(next.is_err(), "unexpected emission: {:?}", next);

    let view = chat.client.view();
    assert_eq!(view.timeline("emp-1")[0].id, id);
    assert!(view.timeline("emp-1")[0].is_pending());
}

/// Test the server-side unread total
#[tokio::test]
async fn test_refresh_unread_total() {
    let chat = TestChat::new();
    chat.history.set_unread_total(4);

    assert_eq!(chat.client.refresh_unread_total().await.unwrap(), 4);
}
