//! Connection Manager
//!
//! Owns the single real-time link of an authenticated session.
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──CONNECT ack──▶ Connected
//!       ▲                        │   ▲                         │
//!       │  auth error / reject / │   └──── link dropped ───────┘
//!       │  retries exhausted     │         (retry, same budget)
//!       └────────────────────────┘
//!       ▲                                                      │
//!       └────── disconnect() / server DISCONNECT ──────────────┘
//! ```
//!
//! A supervisor task per `connect()` owns the transport link. State changes are
//! published on a `watch` channel; every publish is tagged with the
//! supervisor's generation so a superseded supervisor can never overwrite the
//! state of a newer one or of an explicit `disconnect()`.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval};

use super::channel::Channel;
use super::events::{InboundEvent, OutboundEvent};
use super::protocol::{EnginePacket, OpenPayload, SocketPacket};
use super::transport::{Transport, TransportError, TransportLink};
use crate::config::RealtimeSettings;
use crate::domain::SessionProvider;
use crate::infrastructure::metrics;

/// Observable connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a connection could not be established or was lost
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Disconnected by server")]
    ServerDisconnect,

    #[error("Connection cancelled")]
    Cancelled,

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ConnectionError>,
    },
}

impl ConnectionError {
    /// Whether the session credential itself was refused
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            ConnectionError::NotAuthenticated | ConnectionError::Authentication(_)
        )
    }

    /// Terminal errors are never retried automatically
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ConnectionError::Transport(_) | ConnectionError::Timeout(_)
        )
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            ConnectionError::NotAuthenticated | ConnectionError::Authentication(_) => "auth_error",
            ConnectionError::Rejected(_) => "rejected",
            ConnectionError::Timeout(_) => "timeout",
            _ => "transport_error",
        }
    }
}

/// Classify a Socket.IO CONNECT_ERROR message.
fn classify_connect_error(message: String) -> ConnectionError {
    if message.to_lowercase().contains("authentication") {
        ConnectionError::Authentication(message)
    } else {
        ConnectionError::Rejected(message)
    }
}

/// Status plus the most recent error
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_error: Option<ConnectionError>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Mutable control block guarded by one lock
pub(super) struct Control {
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    /// Present exactly while connected
    pub(super) outbound: Option<mpsc::UnboundedSender<OutboundEvent>>,
    /// `connect()` callers waiting for the current attempt to settle
    waiters: Vec<oneshot::Sender<Result<(), ConnectionError>>>,
}

impl Control {
    /// Resolve every pending `connect()` with `outcome`.
    fn settle(&mut self, outcome: Result<(), ConnectionError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// State shared between the manager, its supervisor and channel handles
pub(super) struct Shared {
    pub(super) control: Mutex<Control>,
    pub(super) state_tx: watch::Sender<ConnectionState>,
    pub(super) events_tx: broadcast::Sender<InboundEvent>,
}

impl Shared {
    /// Publish a state from the supervisor of `generation`. Returns `false`
    /// when that supervisor has been superseded.
    fn publish(
        &self,
        generation: u64,
        state: ConnectionState,
        outbound: Option<mpsc::UnboundedSender<OutboundEvent>>,
    ) -> bool {
        let mut control = self.control.lock();
        if control.generation != generation {
            return false;
        }
        if state.status == ConnectionStatus::Disconnected {
            control.shutdown = None;
        }
        control.outbound = outbound;
        match state.status {
            ConnectionStatus::Connected => control.settle(Ok(())),
            ConnectionStatus::Disconnected => control.settle(Err(state
                .last_error
                .clone()
                .unwrap_or(ConnectionError::Cancelled))),
            ConnectionStatus::Connecting => {}
        }
        metrics::set_connection_status(state.status);
        self.state_tx.send_replace(state);
        true
    }
}

/// Manages exactly one real-time channel per authenticated session
pub struct ConnectionManager {
    settings: RealtimeSettings,
    transport: Arc<dyn Transport>,
    sessions: Arc<dyn SessionProvider>,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        settings: RealtimeSettings,
        transport: Arc<dyn Transport>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let (events_tx, _) = broadcast::channel(settings.event_buffer.max(1));

        Self {
            settings,
            transport,
            sessions,
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    generation: 0,
                    shutdown: None,
                    outbound: None,
                    waiters: Vec::new(),
                }),
                state_tx,
                events_tx,
            }),
        }
    }

    /// Connect and wait for the outcome.
    ///
    /// Resolves on the first successful handshake, even if the link drops
    /// right after. While connected this returns at once; while connecting
    /// the caller shares the outcome of the attempt already in flight.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let session = self
            .sessions
            .current_session()
            .ok_or(ConnectionError::NotAuthenticated)?;

        let outcome = {
            let mut control = self.shared.control.lock();
            let status = self.shared.state_tx.borrow().status;

            match status {
                ConnectionStatus::Connected => {
                    tracing::debug!("connect() ignored, already connected");
                    return Ok(());
                }
                ConnectionStatus::Connecting => {
                    tracing::debug!("connect() joining the attempt in flight");
                }
                ConnectionStatus::Disconnected => {
                    control.generation += 1;
                    let (shutdown_tx, shutdown_rx) = oneshot::channel();
                    control.shutdown = Some(shutdown_tx);
                    control.outbound = None;

                    metrics::set_connection_status(ConnectionStatus::Connecting);
                    self.shared.state_tx.send_replace(ConnectionState {
                        status: ConnectionStatus::Connecting,
                        last_error: None,
                    });

                    let supervisor = Supervisor {
                        generation: control.generation,
                        settings: self.settings.clone(),
                        transport: self.transport.clone(),
                        shared: self.shared.clone(),
                        token: session.token,
                    };

                    tracing::info!(
                        user_id = %session.user_id,
                        generation = control.generation,
                        "Connecting to real-time server"
                    );

                    tokio::spawn(supervisor.run(shutdown_rx));
                }
            }

            let (outcome_tx, outcome_rx) = oneshot::channel();
            control.waiters.push(outcome_tx);
            outcome_rx
        };

        outcome.await.unwrap_or(Err(ConnectionError::Cancelled))
    }

    /// Close the link and cancel any pending retry. Idempotent.
    pub fn disconnect(&self) {
        let mut control = self.shared.control.lock();
        control.generation += 1;
        control.outbound = None;
        if let Some(shutdown) = control.shutdown.take() {
            let _ = shutdown.send(());
        }
        control.settle(Err(ConnectionError::Cancelled));

        metrics::set_connection_status(ConnectionStatus::Disconnected);
        let previous = self.shared.state_tx.send_replace(ConnectionState::default());

        if previous.status != ConnectionStatus::Disconnected {
            tracing::info!(previous = %previous.status, "Disconnected from real-time server");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state_tx.borrow().status
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Scoped handle for emitting and subscribing
    pub fn channel(&self) -> Channel {
        Channel::new(self.shared.clone())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// How an established session ended
enum SessionEnd {
    Shutdown,
    ServerDisconnect,
    Dropped(ConnectionError),
}

struct Supervisor {
    generation: u64,
    settings: RealtimeSettings,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    token: String,
}

impl Supervisor {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let max_attempts = self.settings.reconnection_attempts.max(1);
        let connect_timeout = Duration::from_millis(self.settings.connect_timeout_ms);
        let delay = Duration::from_millis(self.settings.reconnection_delay_ms);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                _ = &mut shutdown => return,
                result = time::timeout(connect_timeout, self.handshake()) => {
                    result.unwrap_or(Err(ConnectionError::Timeout(connect_timeout)))
                }
            };

            match outcome {
                Ok((link, open)) => {
                    metrics::record_connection_attempt("connected");
                    tracing::info!(attempt, "Connected to real-time server");
                    attempt = 0;

                    match self.run_session(link, open, &mut shutdown).await {
                        SessionEnd::Shutdown => return,
                        SessionEnd::ServerDisconnect => {
                            tracing::info!("Server closed the session");
                            self.publish(ConnectionStatus::Disconnected, Some(ConnectionError::ServerDisconnect));
                            return;
                        }
                        SessionEnd::Dropped(error) => {
                            tracing::warn!(error = %error, "Connection lost, reconnecting");
                            if !self.publish(ConnectionStatus::Connecting, Some(error)) {
                                return;
                            }
                        }
                    }
                }
                Err(error) => {
                    metrics::record_connection_attempt(error.outcome_label());

                    if error.is_terminal() {
                        tracing::warn!(error = %error, "Connection refused, not retrying");
                        self.publish(ConnectionStatus::Disconnected, Some(error));
                        return;
                    }

                    if attempt >= max_attempts {
                        tracing::warn!(attempts = attempt, error = %error, "Giving up on real-time server");
                        self.publish(
                            ConnectionStatus::Disconnected,
                            Some(ConnectionError::RetriesExhausted {
                                attempts: attempt,
                                last: Box::new(error),
                            }),
                        );
                        return;
                    }

                    tracing::debug!(attempt, max_attempts, error = %error, "Connection attempt failed");
                    if !self.publish(ConnectionStatus::Connecting, Some(error)) {
                        return;
                    }
                }
            }

            tokio::select! {
                _ = &mut shutdown => return,
                _ = time::sleep(delay) => {}
            }
        }
    }

    fn publish(&self, status: ConnectionStatus, last_error: Option<ConnectionError>) -> bool {
        self.shared
            .publish(self.generation, ConnectionState { status, last_error }, None)
    }

    /// Engine.IO open, then Socket.IO CONNECT with the session token.
    async fn handshake(&self) -> Result<(TransportLink, OpenPayload), ConnectionError> {
        let mut link = self.transport.open().await.map_err(transport_error)?;

        let open = loop {
            match link.stream.next().await {
                Some(Ok(EnginePacket::Open(open))) => break open,
                Some(Ok(EnginePacket::Noop)) => continue,
                Some(Ok(other)) => {
                    return Err(ConnectionError::Transport(format!(
                        "expected open packet, got {:?}",
                        other
                    )))
                }
                Some(Err(e)) => return Err(transport_error(e)),
                None => return Err(transport_error(TransportError::Closed)),
            }
        };

        tracing::debug!(sid = %open.sid, ping_interval = open.ping_interval, "Engine.IO session opened");

        link.sink
            .send(EnginePacket::Message(SocketPacket::Connect(Some(
                json!({ "token": self.token }),
            ))))
            .await
            .map_err(transport_error)?;

        loop {
            match link.stream.next().await {
                Some(Ok(EnginePacket::Message(SocketPacket::Connect(_)))) => break,
                Some(Ok(EnginePacket::Message(SocketPacket::ConnectError(message)))) => {
                    return Err(classify_connect_error(message))
                }
                Some(Ok(EnginePacket::Ping(data))) => {
                    link.sink
                        .send(EnginePacket::Pong(data))
                        .await
                        .map_err(transport_error)?;
                }
                Some(Ok(EnginePacket::Close)) => return Err(transport_error(TransportError::Closed)),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(transport_error(e)),
                None => return Err(transport_error(TransportError::Closed)),
            }
        }

        Ok((link, open))
    }

    async fn run_session(
        &self,
        link: TransportLink,
        open: OpenPayload,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> SessionEnd {
        let TransportLink {
            mut sink,
            mut stream,
        } = link;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let connected = ConnectionState {
            status: ConnectionStatus::Connected,
            last_error: None,
        };
        if !self.shared.publish(self.generation, connected, Some(outbound_tx)) {
            return SessionEnd::Shutdown;
        }

        let liveness = match open.ping_interval + open.ping_timeout {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let mut deadline = liveness.map(|d| Instant::now() + d);
        let mut keepalive = match self.settings.ping_interval_ms {
            0 => None,
            ms => {
                let period = Duration::from_millis(ms);
                Some(time::interval_at(Instant::now() + period, period))
            }
        };

        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    let _ = sink.send(EnginePacket::Message(SocketPacket::Disconnect)).await;
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }

                frame = stream.next() => {
                    deadline = liveness.map(|d| Instant::now() + d);
                    match frame {
                        Some(Ok(EnginePacket::Ping(data))) => {
                            tracing::trace!("Heartbeat ping");
                            if let Err(e) = sink.send(EnginePacket::Pong(data)).await {
                                return SessionEnd::Dropped(transport_error(e));
                            }
                        }
                        Some(Ok(EnginePacket::Message(SocketPacket::Event { name, payload, .. }))) => {
                            self.dispatch(&name, payload);
                        }
                        Some(Ok(EnginePacket::Message(SocketPacket::Disconnect))) => {
                            return SessionEnd::ServerDisconnect;
                        }
                        Some(Ok(EnginePacket::Close)) => {
                            return SessionEnd::Dropped(transport_error(TransportError::Closed));
                        }
                        Some(Ok(other)) => {
                            tracing::trace!(packet = ?other, "Ignoring packet");
                        }
                        Some(Err(TransportError::Protocol(e))) => {
                            tracing::warn!(error = %e, "Dropping undecodable frame");
                        }
                        Some(Err(e)) => return SessionEnd::Dropped(transport_error(e)),
                        None => return SessionEnd::Dropped(transport_error(TransportError::Closed)),
                    }
                }

                Some(event) = outbound_rx.recv() => {
                    tracing::debug!(event = event.event_name(), "Emitting");
                    let packet = EnginePacket::event(event.event_name(), event.to_json());
                    if let Err(e) = sink.send(packet).await {
                        return SessionEnd::Dropped(transport_error(e));
                    }
                }

                _ = sleep_until(deadline) => {
                    return SessionEnd::Dropped(ConnectionError::Transport("heartbeat timeout".into()));
                }

                _ = tick(&mut keepalive) => {
                    tracing::trace!("Keep-alive ping");
                    let event = OutboundEvent::Ping;
                    if let Err(e) = sink.send(EnginePacket::event(event.event_name(), event.to_json())).await {
                        return SessionEnd::Dropped(transport_error(e));
                    }
                }
            }
        }
    }

    fn dispatch(&self, name: &str, payload: Value) {
        match InboundEvent::decode(name, payload) {
            Ok(Some(event)) => {
                metrics::record_inbound_event(event.event_name());
                if matches!(event, InboundEvent::Pong) {
                    tracing::trace!("Keep-alive pong");
                } else {
                    tracing::debug!(event = name, "Received event");
                }
                // No subscribers is not an error
                let _ = self.shared.events_tx.send(event);
            }
            Ok(None) => tracing::debug!(event = name, "Ignoring unknown event"),
            Err(e) => tracing::warn!(event = name, error = %e, "Dropping malformed event"),
        }
    }
}

fn transport_error(e: TransportError) -> ConnectionError {
    ConnectionError::Transport(e.to_string())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthenticatedSession, Role};
    use crate::infrastructure::cache::SessionStore;
    use crate::infrastructure::realtime::memory::{MemoryServer, MemoryTransport};
    use crate::infrastructure::realtime::ChannelError;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn settings() -> RealtimeSettings {
        RealtimeSettings {
            reconnection_attempts: 3,
            reconnection_delay_ms: 10,
            connect_timeout_ms: 1000,
            ..RealtimeSettings::default()
        }
    }

    fn manager_with(settings: RealtimeSettings, logged_in: bool) -> (ConnectionManager, MemoryServer) {
        let (transport, server) = MemoryTransport::pair();
        let sessions = Arc::new(SessionStore::new());
        if logged_in {
            sessions.login(AuthenticatedSession::new("owner-1", Role::Owner, "secret-token"));
        }
        (
            ConnectionManager::new(settings, Arc::new(transport), sessions),
            server,
        )
    }

    #[test_case("Authentication token required", true ; "missing token")]
    #[test_case("Invalid authentication token", true ; "bad token")]
    #[test_case("Server full", false ; "other rejection")]
    fn test_classify_connect_error(message: &str, is_auth: bool) {
        let error = classify_connect_error(message.to_string());
        assert_eq!(error.is_authentication(), is_auth);
        assert!(error.is_terminal());
    }

    #[tokio::test]
    async fn test_connect_requires_session() {
        let (manager, server) = manager_with(settings(), false);

        assert_eq!(manager.connect().await, Err(ConnectionError::NotAuthenticated));
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(server.open_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_sends_token_and_is_idempotent() {
        let (manager, mut server) = manager_with(settings(), true);

        let (result, (_link, auth)) = tokio::join!(manager.connect(), async {
            let mut link = server.accept().await.unwrap();
            let auth = link.handshake().await;
            (link, auth)
        });

        assert_eq!(result, Ok(()));
        assert_eq!(auth, Some(json!({ "token": "secret-token" })));
        assert_eq!(manager.state(), ConnectionState {
            status: ConnectionStatus::Connected,
            last_error: None,
        });

        assert_eq!(manager.connect().await, Ok(()));
        assert_eq!(manager.connect().await, Ok(()));
        assert_eq!(server.open_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_rejection_is_terminal() {
        let (manager, mut server) = manager_with(settings(), true);

        let (result, _link) = tokio::join!(manager.connect(), async {
            let mut link = server.accept().await.unwrap();
            link.open(25_000, 20_000);
            link.expect_connect().await;
            link.reject_connect("Invalid authentication token");
            link
        });

        let error = result.unwrap_err();
        assert!(error.is_authentication());
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(manager.state().last_error, Some(error));

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let (manager, server) = manager_with(settings(), true);
        server.refuse_next(10);

        let error = manager.connect().await.unwrap_err();

        match &error {
            ConnectionError::RetriesExhausted { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**last, ConnectionError::Transport(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(server.open_count(), 3);
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_counts_as_attempt() {
        let (manager, mut server) = manager_with(
            RealtimeSettings {
                reconnection_attempts: 1,
                ..settings()
            },
            true,
        );

        // Accept the link but never answer
        let (result, _link) = tokio::join!(manager.connect(), server.accept());

        assert_eq!(
            result,
            Err(ConnectionError::RetriesExhausted {
                attempts: 1,
                last: Box::new(ConnectionError::Timeout(Duration::from_millis(1000))),
            })
        );
    }

    #[tokio::test]
    async fn test_reconnects_after_drop() {
        let (manager, mut server) = manager_with(settings(), true);

        let (result, link) = tokio::join!(manager.connect(), async {
            let mut link = server.accept().await.unwrap();
            link.handshake().await;
            link
        });
        assert_eq!(result, Ok(()));

        let mut states = manager.watch();
        link.fail("connection reset");

        states
            .wait_for(|s| s.status == ConnectionStatus::Connecting)
            .await
            .unwrap();
        assert!(matches!(
            manager.state().last_error,
            Some(ConnectionError::Transport(_))
        ));

        let mut second = server.accept().await.unwrap();
        second.handshake().await;

        states
            .wait_for(|s| s.status == ConnectionStatus::Connected)
            .await
            .unwrap();
        assert_eq!(server.open_count(), 2);
    }

    #[tokio::test]
    async fn test_connect_succeeds_when_link_drops_after_handshake() {
        let (manager, mut server) = manager_with(settings(), true);
        let mut states = manager.watch();

        let (result, _) = tokio::join!(manager.connect(), async {
            let mut link = server.accept().await.unwrap();
            link.handshake().await;
            drop(link);
        });

        assert_eq!(result, Ok(()));
        states
            .wait_for(|s| s.status == ConnectionStatus::Connecting)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_connect() {
        let (manager, mut server) = manager_with(settings(), true);

        let (result, _link) = tokio::join!(manager.connect(), async {
            let link = server.accept().await.unwrap();
            manager.disconnect();
            link
        });

        assert_eq!(result, Err(ConnectionError::Cancelled));
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_server_disconnect_is_not_retried() {
        let (manager, mut server) = manager_with(settings(), true);

        let (_, link) = tokio::join!(manager.connect(), async {
            let mut link = server.accept().await.unwrap();
            link.handshake().await;
            link
        });

        let mut states = manager.watch();
        link.disconnect();
        states
            .wait_for(|s| s.status == ConnectionStatus::Disconnected)
            .await
            .unwrap();

        assert_eq!(manager.state().last_error, Some(ConnectionError::ServerDisconnect));
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.open_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_sends_socket_disconnect() {
        let (manager, mut server) = manager_with(settings(), true);

        let (_, mut link) = tokio::join!(manager.connect(), async {
            let mut link = server.accept().await.unwrap();
            link.handshake().await;
            link
        });

        manager.disconnect();
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);

        let mut saw_disconnect = false;
        while let Some(packet) = link.recv().await {
            if packet == EnginePacket::Message(SocketPacket::Disconnect) {
                saw_disconnect = true;
            }
        }
        assert!(saw_disconnect);

        // Safe to repeat
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::default());
    }

    #[tokio::test]
    async fn test_channel_emits_only_while_connected() {
        let (manager, mut server) = manager_with(settings(), true);
        let channel = manager.channel();

        assert_eq!(
            channel.emit(OutboundEvent::typing_start("emp-1")),
            Err(ChannelError::NotConnected)
        );

        let (_, mut link) = tokio::join!(manager.connect(), async {
            let mut link = server.accept().await.unwrap();
            link.handshake().await;
            link
        });

        channel.emit(OutboundEvent::typing_start("emp-1")).unwrap();
        assert_eq!(
            link.next_event().await,
            Some(("typing_start".to_string(), json!({ "recipientId": "emp-1" })))
        );
    }

    #[tokio::test]
    async fn test_inbound_events_and_heartbeat() {
        let (manager, mut server) = manager_with(settings(), true);
        let mut events = manager.channel().subscribe();

        let (_, mut link) = tokio::join!(manager.connect(), async {
            let mut link = server.accept().await.unwrap();
            link.handshake().await;
            link
        });

        link.emit("user_online", json!({ "userId": "emp-7" }));
        link.emit("user_online", json!({ "bogus": true }));
        link.emit("user_offline", json!({ "userId": "emp-7" }));

        assert_eq!(events.recv().await.unwrap().event_name(), "user_online");
        // The malformed frame is dropped without closing the link
        assert_eq!(events.recv().await.unwrap().event_name(), "user_offline");

        link.ping();
        let mut answered = false;
        while let Some(packet) = link.recv().await {
            if let EnginePacket::Pong(_) = packet {
                answered = true;
                break;
            }
        }
        assert!(answered);
        assert!(manager.state().is_connected());
    }
}
