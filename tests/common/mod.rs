#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for party room client integration tests.
//!
//! Provides a scripted [`MockConnector`], a channel-based [`MockTransport`]
//! driven through its [`MockPeer`], a [`RecordingObserver`], and a
//! [`CountingStorage`] backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use party_room_client::protocol::{ClientMessage, ServerMessage};
use party_room_client::storage::{MemoryStorage, SessionStorage};
use party_room_client::{
    Connector, PartyRoomError, RecoveredSession, SessionEvent, SessionObserver, SessionRecord,
    Transport,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

type Incoming = Option<Result<String, PartyRoomError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-based mock transport.
///
/// Server traffic is pushed through the paired [`MockPeer`]. When nothing is
/// queued `recv()` waits, so the driver stays alive until the test acts.
pub struct MockTransport {
    id: String,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), PartyRoomError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PartyRoomError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, PartyRoomError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Peer dropped by the test; hang like an idle socket.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), PartyRoomError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn connection_id(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

/// The server side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockPeer {
    pub id: String,
    tx: mpsc::UnboundedSender<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockPeer {
    /// Deliver a server message to the client.
    pub fn push(&self, message: &ServerMessage) {
        let json = serde_json::to_string(message).expect("serialize server message");
        self.push_raw(&json);
    }

    /// Deliver raw text, valid JSON or not.
    pub fn push_raw(&self, text: &str) {
        let _ = self.tx.send(Some(Ok(text.to_owned())));
    }

    /// The server closes the connection deliberately.
    pub fn close(&self) {
        let _ = self.tx.send(None);
    }

    /// The connection drops without a close handshake.
    pub fn drop_connection(&self) {
        let _ = self.tx.send(Some(Err(PartyRoomError::TransportClosed)));
    }

    /// Every message the client sent on this connection, decoded.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("client sent invalid JSON"))
            .collect()
    }

    /// Whether the client closed this connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── MockConnector ───────────────────────────────────────────────────

enum Plan {
    Accept(String),
    Refuse,
}

#[derive(Default)]
struct ConnectorShared {
    plan: StdMutex<VecDeque<Plan>>,
    attempts: StdMutex<Vec<Instant>>,
    peers: StdMutex<Vec<MockPeer>>,
}

/// A [`Connector`] that follows a scripted plan. Attempts beyond the plan
/// are refused.
pub struct MockConnector {
    shared: Arc<ConnectorShared>,
}

/// Test-side handle for scripting and inspecting a [`MockConnector`].
#[derive(Clone)]
pub struct ConnectorHandle {
    shared: Arc<ConnectorShared>,
}

pub fn mock_connector() -> (MockConnector, ConnectorHandle) {
    let shared = Arc::new(ConnectorShared::default());
    (
        MockConnector {
            shared: Arc::clone(&shared),
        },
        ConnectorHandle { shared },
    )
}

impl ConnectorHandle {
    /// The next attempt succeeds with a transport whose connection id is `id`.
    pub fn accept(&self, id: &str) -> &Self {
        self.shared
            .plan
            .lock()
            .unwrap()
            .push_back(Plan::Accept(id.to_owned()));
        self
    }

    /// The next `count` attempts fail.
    pub fn refuse(&self, count: usize) -> &Self {
        let mut plan = self.shared.plan.lock().unwrap();
        for _ in 0..count {
            plan.push_back(Plan::Refuse);
        }
        self
    }

    pub fn attempts(&self) -> usize {
        self.shared.attempts.lock().unwrap().len()
    }

    /// The (tokio) instant of every attempt, in order.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.shared.attempts.lock().unwrap().clone()
    }

    /// The peer of the `index`-th accepted connection, once it exists.
    pub async fn peer(&self, index: usize) -> MockPeer {
        wait_until(|| self.shared.peers.lock().unwrap().len() > index).await;
        self.shared.peers.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&mut self) -> Result<Box<dyn Transport>, PartyRoomError> {
        self.shared.attempts.lock().unwrap().push(Instant::now());
        let next = self.shared.plan.lock().unwrap().pop_front();
        match next {
            Some(Plan::Accept(id)) => {
                let (tx, incoming) = mpsc::unbounded_channel();
                let sent = Arc::new(StdMutex::new(Vec::new()));
                let closed = Arc::new(AtomicBool::new(false));
                self.shared.peers.lock().unwrap().push(MockPeer {
                    id: id.clone(),
                    tx,
                    sent: Arc::clone(&sent),
                    closed: Arc::clone(&closed),
                });
                Ok(Box::new(MockTransport {
                    id,
                    incoming,
                    sent,
                    closed,
                }))
            }
            Some(Plan::Refuse) | None => Err(PartyRoomError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

// ── RecordingObserver ───────────────────────────────────────────────

/// Records every observer callback as a [`SessionEvent`].
#[derive(Default)]
pub struct RecordingObserver {
    events: StdMutex<Vec<SessionEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_changed(&self, state: party_room_client::ConnectionState) {
        self.record(SessionEvent::StateChanged(state));
    }

    fn on_session_saved(&self, record: &SessionRecord) {
        self.record(SessionEvent::SessionSaved(record.clone()));
    }

    fn on_recovered(&self, session: &RecoveredSession) {
        self.record(SessionEvent::Recovered(Box::new(session.clone())));
    }

    fn on_recovery_failed(&self, reason: &str) {
        self.record(SessionEvent::RecoveryFailed {
            reason: reason.to_owned(),
        });
    }

    fn on_reconnection_failed(&self) {
        self.record(SessionEvent::ReconnectionFailed);
    }

    fn on_roster_changed(&self, participants: &[party_room_client::Participant]) {
        self.record(SessionEvent::RosterChanged(participants.to_vec()));
    }
}

// ── CountingStorage ─────────────────────────────────────────────────

/// [`MemoryStorage`] that counts writes and removes.
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    pub writes: AtomicUsize,
    pub removes: AtomicUsize,
}

impl SessionStorage for CountingStorage {
    fn read(&self, key: &str) -> Result<Option<String>, PartyRoomError> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PartyRoomError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PartyRoomError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Install a test-friendly subscriber once per test binary. Set `RUST_LOG`
/// to see the client's logs in failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds. Panics after 60 seconds (of tokio time,
/// so paused-clock tests still terminate).
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(60);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 60s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Let the driver drain everything already queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
