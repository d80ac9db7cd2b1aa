//! Connection lifecycle tests

use std::time::Duration;

use dashboard_chat::infrastructure::realtime::protocol::{EnginePacket, SocketPacket};
use dashboard_chat::infrastructure::realtime::{ConnectionError, ConnectionStatus};
use dashboard_chat::shared::error::ChatError;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use crate::common::TestChat;

/// Test that the handshake carries the session token
#[tokio::test]
async fn test_connect_presents_token() {
    // Arrange
    let mut chat = TestChat::new();
    let server = &mut chat.server;

    // Act
    let (result, (_link, auth)) = tokio::join!(chat.client.connect(), async {
        let mut link = server.accept().await.unwrap();
        let auth = link.handshake().await;
        (link, auth)
    });

    // Assert
    assert_ok!(result);
    assert_eq!(auth, Some(json!({ "token": "test-token" })));
    assert_eq!(chat.client.connection_state().status, ConnectionStatus::Connected);
}

/// Test that an authentication rejection is terminal
#[tokio::test]
async fn test_auth_rejection_is_not_retried() {
    // Arrange
    let mut chat = TestChat::new();
    let server = &mut chat.server;

    // Act
    let (result, _) = tokio::join!(chat.client.connect(), async {
        let mut link = server.accept().await.unwrap();
        link.open(25_000, 20_000);
        link.expect_connect().await;
        link.reject_connect("Invalid authentication token");
        link
    });

    // Assert
    let error = assert_err!(result);
    assert!(matches!(
        error,
        ChatError::Connection(ConnectionError::Authentication(_))
    ));
    assert!(error.requires_reauthentication());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(chat.server.open_count(), 1);
    let state = chat.client.connection_state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert!(state.last_error.is_some());
}

/// Test that a dropped link is re-established
#[tokio::test]
async fn test_reconnects_after_transport_drop() {
    // Arrange
    let mut chat = TestChat::new();
    let link = chat.connect().await;

    // Act
    link.fail("connection reset");
    let mut second = chat.server.accept().await.unwrap();
    second.handshake().await;

    // Assert
    chat.eventually(|v| v.connection.status == ConnectionStatus::Connected)
        .await;
    assert_eq!(chat.server.open_count(), 2);
}

/// Test that connection attempts stop after the configured budget
#[tokio::test]
async fn test_retry_budget_is_bounded() {
    // Arrange
    let chat = TestChat::new();
    chat.server.refuse_next(10);

    // Act
    let error = assert_err!(chat.client.connect().await);

    // Assert
    match error {
        ChatError::Connection(ConnectionError::RetriesExhausted { attempts, .. }) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(chat.server.open_count(), 3);
    assert_eq!(chat.client.connection_state().status, ConnectionStatus::Disconnected);
}

/// Test that a server-initiated disconnect is final
#[tokio::test]
async fn test_server_disconnect_is_not_retried() {
    // Arrange
    let mut chat = TestChat::new();
    let link = chat.connect().await;

    // Act
    link.disconnect();

    // Assert
    chat.eventually(|v| v.connection.status == ConnectionStatus::Disconnected)
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(chat.server.open_count(), 1);
}

/// Test that logout closes the link and blocks reconnecting
#[tokio::test]
async fn test_logout_closes_link() {
    // Arrange
    let mut chat = TestChat::new();
    let mut link = chat.connect().await;

    // Act
    chat.client.logout();

    // Assert
    let mut saw_disconnect = false;
    while let Some(packet) = link.recv().await {
        if packet == EnginePacket::Message(SocketPacket::Disconnect) {
            saw_disconnect = true;
        }
    }
    assert!(saw_disconnect);
    assert!(chat.sessions.current().is_none());
    assert!(matches!(
        chat.client.connect().await,
        Err(ChatError::Connection(ConnectionError::NotAuthenticated))
    ));
}
