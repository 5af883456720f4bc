//! Async client handle and the background driver task.
//!
//! [`PartyClient`] is the one context object an application constructs at
//! startup. It spawns a single driver task that owns the live transport, the
//! [`ConnectionManager`], the [`RecoveryCoordinator`], the
//! [`RosterReconciler`], and the [`SessionStore`]. Commands from the handle
//! travel over an unbounded MPSC channel; inbound events are processed by
//! the driver strictly in arrival order, so none of the components need
//! locking.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = SessionStore::new(Arc::new(FileStorage::new(data_dir)));
//! let (observer, mut events) = ChannelObserver::new(64);
//! let client = PartyClient::start(
//!     WebSocketConnector::new("wss://party.example.com/ws"),
//!     store,
//!     Arc::new(observer),
//!     PartyClientConfig::new(),
//! );
//! client.connect()?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Recovered(session) => { /* render the room */ }
//!         SessionEvent::RecoveryFailed { .. } => client.join_room("ABC123", "Alice")?,
//!         SessionEvent::ReconnectionFailed => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::connection::{ConnectionManager, ConnectionState, DisconnectReason, ReconnectStep};
use crate::error::{PartyRoomError, Result};
use crate::event::{EventKind, InboundEvent, ListenerId, Listeners};
use crate::observer::{GuardedObserver, SessionObserver};
use crate::protocol::{ClientMessage, Participant, ServerMessage};
use crate::recovery::RecoveryCoordinator;
use crate::roster::RosterReconciler;
use crate::session::{SessionRecord, SessionStore};
use crate::transport::{Connector, Transport};

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`PartyClient`].
///
/// # Example
///
/// ```
/// use party_room_client::backoff::ReconnectPolicy;
/// use party_room_client::client::PartyClientConfig;
/// use std::time::Duration;
///
/// let config = PartyClientConfig::new()
///     .with_reconnect_policy(ReconnectPolicy::new().with_max_attempts(8))
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.reconnect.max_attempts, 8);
/// ```
#[derive(Debug, Clone)]
pub struct PartyClientConfig {
    /// Reconnect backoff schedule and attempt cap.
    ///
    /// Defaults to 1s doubling to a 10s cap, 5 attempts.
    pub reconnect: ReconnectPolicy,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`PartyClient::shutdown`] is called, the driver is given this much
    /// time to close the transport. If the timeout expires the task is
    /// aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl PartyClientConfig {
    pub fn new() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for PartyClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State published by the driver for the handle's accessors.
struct ClientState {
    running: AtomicBool,
    connection: Mutex<ConnectionState>,
    room_code: Mutex<Option<String>>,
    participants: Mutex<Vec<Participant>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            connection: Mutex::new(ConnectionState::Disconnected),
            room_code: Mutex::new(None),
            participants: Mutex::new(Vec::new()),
        }
    }
}

/// Requests from the handle to the driver.
#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Emit(ClientMessage),
    LeaveRoom,
    SetMicMuted(bool),
    AbandonRecovery,
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running party room client.
///
/// All command methods return immediately once the request is queued to the
/// driver; outcomes are reported through the [`SessionObserver`] and the
/// `on` listeners.
pub struct PartyClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<ClientState>,
    listeners: Arc<Listeners>,
    store: SessionStore,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl PartyClient {
    /// Spawn the driver and return its handle. The client starts
    /// [`Disconnected`](ConnectionState::Disconnected); call
    /// [`connect`](Self::connect) to open the first connection.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        connector: impl Connector,
        store: SessionStore,
        observer: Arc<dyn SessionObserver>,
        config: PartyClientConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let listeners = Arc::new(Listeners::new());

        let driver = Driver {
            connector,
            transport: None,
            connection: ConnectionManager::new(config.reconnect),
            recovery: RecoveryCoordinator::new(),
            roster: RosterReconciler::new(),
            store: store.clone(),
            observer: GuardedObserver::new(observer),
            listeners: Arc::clone(&listeners),
            state: Arc::clone(&state),
            retry_at: None,
        };
        let task = tokio::spawn(driver.run(cmd_rx, shutdown_rx));

        Self {
            cmd_tx,
            state,
            listeners,
            store,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// Open the connection. A no-op (with a warning) if already connected.
    /// After reconnection has failed this resets the attempt counter.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::ClientShutDown`] if the driver has exited.
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::ClientShutDown`] if the driver has exited.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    // ── Pub/sub ─────────────────────────────────────────────────────

    /// Register `handler` for inbound events of `kind`. Handlers run on the
    /// driver task, in arrival order, and must not block.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.listeners.on(kind, handler)
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    /// Send `message` to the server.
    ///
    /// If no transport is connected when the driver handles the message, it
    /// is dropped with a warning. Messages are never queued for a later
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::ClientShutDown`] if the driver has exited.
    pub fn emit(&self, message: ClientMessage) -> Result<()> {
        self.send(Command::Emit(message))
    }

    // ── Room commands ───────────────────────────────────────────────

    /// Ask the server to create a room hosted by `username`.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::ClientShutDown`] if the driver has exited.
    pub fn create_room(&self, username: impl Into<String>) -> Result<()> {
        self.emit(ClientMessage::CreateRoom {
            username: username.into(),
        })
    }

    /// Ask the server to join the room `room_code` as `username`.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::ClientShutDown`] if the driver has exited.
    pub fn join_room(&self, room_code: impl Into<String>, username: impl Into<String>) -> Result<()> {
        self.emit(ClientMessage::JoinRoom {
            room_code: room_code.into(),
            username: username.into(),
        })
    }

    /// Leave the current room, forget the stored session, and empty the
    /// local roster.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::ClientShutDown`] if the driver has exited.
    pub fn leave_room(&self) -> Result<()> {
        self.send(Command::LeaveRoom)
    }

    /// Ask the server to mute or unmute this user. The roster changes only
    /// when the server echoes the update.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::ClientShutDown`] if the driver has exited.
    pub fn set_mic_muted(&self, muted: bool) -> Result<()> {
        self.send(Command::SetMicMuted(muted))
    }

    /// Give up on an in-flight session recovery, e.g. when the application's
    /// boot deadline expires. Reported as a recovery failure; a late answer
    /// from the server is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::ClientShutDown`] if the driver has exited.
    pub fn abandon_recovery(&self) -> Result<()> {
        self.send(Command::AbandonRecovery)
    }

    /// Shut down the client, closing the transport and stopping the driver.
    pub async fn shutdown(&mut self) {
        debug!("PartyClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the driver with a timeout so it cannot detach and run
        // indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("driver terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("driver did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("driver aborted: {join_err}");
                    }
                }
            }
        }

        self.state.running.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` until the driver exits.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.connection.lock().await
    }

    /// The roster in presentation order.
    pub async fn participants(&self) -> Vec<Participant> {
        self.state.participants.lock().await.clone()
    }

    /// The code of the room this client is in, if any.
    pub async fn current_room_code(&self) -> Option<String> {
        self.state.room_code.lock().await.clone()
    }

    /// The stored session record, if one is live.
    pub fn saved_session(&self) -> Option<SessionRecord> {
        self.store.load()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.state.running.load(Ordering::Acquire) {
            return Err(PartyRoomError::ClientShutDown);
        }
        self.cmd_tx
            .send(cmd)
            .map_err(|_| PartyRoomError::ClientShutDown)
    }
}

impl std::fmt::Debug for PartyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartyClient")
            .field("running", &self.is_running())
            .field("listeners", &self.listeners.len())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for PartyClient {
    fn drop(&mut self) {
        // No executor context to drive a graceful close from `Drop`; abort
        // the driver so it cannot outlive the handle.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Driver ──────────────────────────────────────────────────────────

/// Owns the transport and every component; runs on one task.
struct Driver<C> {
    connector: C,
    transport: Option<Box<dyn Transport>>,
    connection: ConnectionManager,
    recovery: RecoveryCoordinator,
    roster: RosterReconciler,
    store: SessionStore,
    observer: GuardedObserver,
    listeners: Arc<Listeners>,
    state: Arc<ClientState>,
    retry_at: Option<Instant>,
}

impl<C: Connector> Driver<C> {
    /// Multiplexes commands, inbound messages, and the reconnect timer.
    ///
    /// Exits when the shutdown signal fires or the handle is dropped.
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("driver started");

        loop {
            let retry_at = self.retry_at;
            let has_transport = self.transport.is_some();

            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    self.close_transport().await;
                    break;
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            debug!("command channel closed, shutting down driver");
                            self.close_transport().await;
                            break;
                        }
                    }
                }

                incoming = recv_next(&mut self.transport), if has_transport => {
                    self.handle_incoming(incoming).await;
                }

                () = sleep_until(retry_at), if retry_at.is_some() => {
                    self.retry_at = None;
                    info!(attempt = self.connection.attempt(), "reconnecting");
                    self.open_transport().await;
                }
            }
        }

        self.state.running.store(false, Ordering::Release);
        debug!("driver exited");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => {
                if self.connection.begin_connect() {
                    self.retry_at = None;
                    self.publish_state().await;
                    self.open_transport().await;
                }
            }
            Command::Disconnect => self.disconnect().await,
            Command::Emit(message) => self.emit(message).await,
            Command::LeaveRoom => self.leave_room().await,
            Command::SetMicMuted(mic_muted) => {
                let room_code = self.state.room_code.lock().await.clone();
                match room_code {
                    Some(room_code) => {
                        self.emit(ClientMessage::ToggleMic {
                            room_code,
                            mic_muted,
                        })
                        .await;
                    }
                    None => warn!("set_mic_muted called while not in a room; ignoring"),
                }
            }
            Command::AbandonRecovery => {
                if !self.recovery.abandon(&self.store, &self.observer) {
                    debug!("abandon_recovery called with no recovery in flight");
                }
            }
        }
    }

    // ── Transport lifecycle ─────────────────────────────────────────

    async fn open_transport(&mut self) {
        self.close_transport().await;

        match self.connector.connect().await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.connection.on_connected();
                self.publish_state().await;
                info!("connected");
                self.listeners.dispatch(&InboundEvent::Connect);

                if let Some(request) = self.recovery.begin(&self.store) {
                    self.emit(request).await;
                }
            }
            Err(e) => {
                warn!("connect attempt failed: {e}");
                self.listeners.dispatch(&InboundEvent::ConnectError {
                    error: e.to_string(),
                });
                let step = self.connection.on_connect_error();
                self.apply_step(step).await;
            }
        }
    }

    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("transport close failed: {e}");
            }
        }
    }

    /// The live transport ended on its own.
    async fn lost_transport(&mut self, reason: DisconnectReason) {
        self.transport = None;
        // A request sent on the dead connection will never be answered.
        self.recovery.reset();
        info!(%reason, "disconnected");
        self.listeners.dispatch(&InboundEvent::Disconnect {
            reason: reason.clone(),
        });
        let step = self.connection.on_disconnected(&reason);
        self.apply_step(step).await;
    }

    /// User-directed teardown.
    async fn disconnect(&mut self) {
        self.retry_at = None;
        let had_transport = self.transport.is_some();
        self.close_transport().await;
        self.recovery.reset();
        self.connection.disconnect();
        self.publish_state().await;
        if had_transport {
            info!("disconnected by client");
            self.listeners.dispatch(&InboundEvent::Disconnect {
                reason: DisconnectReason::ClientDisconnect,
            });
        }
    }

    async fn apply_step(&mut self, step: ReconnectStep) {
        match step {
            ReconnectStep::Idle => {}
            ReconnectStep::Retry { attempt, delay } => {
                info!(attempt, ?delay, "scheduling reconnect");
                self.retry_at = Some(Instant::now() + delay);
            }
            ReconnectStep::Exhausted => {
                error!(
                    attempts = self.connection.policy().max_attempts,
                    "reconnection attempts exhausted"
                );
                self.retry_at = None;
                self.recovery.reset();
                if let Err(e) = self.store.clear() {
                    warn!("failed to clear session after reconnection failure: {e}");
                }
                self.observer.on_reconnection_failed();
            }
        }
        self.publish_state().await;
    }

    // ── Outbound ────────────────────────────────────────────────────

    async fn emit(&mut self, message: ClientMessage) {
        let Some(transport) = self.transport.as_mut() else {
            warn!(
                event = message.name(),
                "emit while not connected; dropping message"
            );
            return;
        };

        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize client message: {e}");
                return;
            }
        };

        debug!(event = message.name(), "sending client message");
        if let Err(e) = transport.send(json).await {
            error!("transport send error: {e}");
            self.lost_transport(reason_for(e)).await;
        }
    }

    async fn leave_room(&mut self) {
        let room_code = self.state.room_code.lock().await.take();
        match room_code {
            Some(room_code) => self.emit(ClientMessage::LeaveRoom { room_code }).await,
            None => debug!("leave_room called while not in a room"),
        }
        self.recovery.reset();
        if let Err(e) = self.store.clear() {
            warn!("failed to clear session on leave: {e}");
        }
        self.roster.clear();
        self.publish_roster().await;
    }

    // ── Inbound ─────────────────────────────────────────────────────

    async fn handle_incoming(&mut self, incoming: Option<Result<String>>) {
        match incoming {
            Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => self.handle_message(message).await,
                Err(e) => {
                    warn!("failed to deserialize server message: {e}; raw: {text}");
                }
            },
            Some(Err(e)) => {
                error!("transport receive error: {e}");
                self.lost_transport(reason_for(e)).await;
            }
            None => {
                debug!("transport closed by server");
                self.lost_transport(DisconnectReason::ServerDisconnect).await;
            }
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        debug!(event = %message.kind(), "received server message");

        match &message {
            ServerMessage::RoomCreated(payload) => {
                self.remember_session(&payload.room_code, &payload.user).await;
                let participants = payload
                    .room
                    .participants
                    .clone()
                    .unwrap_or_else(|| vec![payload.user.clone()]);
                self.roster.set_participants(participants);
                self.publish_roster().await;
            }
            ServerMessage::RoomJoined(payload) => {
                self.remember_session(&payload.room_code, &payload.user).await;
                self.roster.set_participants(payload.participants.clone());
                self.publish_roster().await;
            }
            ServerMessage::SessionRecovered(payload) => {
                let transport_id = self.transport.as_ref().and_then(|t| t.connection_id());
                let recovered = self.recovery.complete(
                    payload,
                    transport_id.as_deref(),
                    &self.store,
                    &mut self.roster,
                    &self.observer,
                );
                if let Some(recovered) = recovered {
                    *self.state.room_code.lock().await = Some(recovered.record.room_code);
                    self.publish_roster().await;
                }
            }
            ServerMessage::SessionRecoveryFailed { error } => {
                if self
                    .recovery
                    .fail(error, &self.store, &self.observer)
                {
                    *self.state.room_code.lock().await = None;
                }
            }
            ServerMessage::ParticipantJoined(_)
            | ServerMessage::ParticipantLeft(_)
            | ServerMessage::ParticipantMicUpdated(_)
            | ServerMessage::MicUpdated(_)
            | ServerMessage::ParticipantDisconnected(_) => {
                if self.roster.apply_message(&message) {
                    self.publish_roster().await;
                }
            }
            ServerMessage::Error { message } => {
                warn!(%message, "server reported an error");
            }
        }

        self.listeners.dispatch(&InboundEvent::Message(message));
    }

    async fn remember_session(&mut self, room_code: &str, user: &Participant) {
        match self
            .store
            .save(room_code, user.username.as_str(), user.is_host, user.id.as_str())
        {
            Ok(record) => {
                info!(room_code = %record.room_code, "session saved");
                self.observer.on_session_saved(&record);
            }
            Err(e) => warn!("failed to persist session: {e}"),
        }
        *self.state.room_code.lock().await = Some(room_code.to_owned());
    }

    // ── Publishing ──────────────────────────────────────────────────

    async fn publish_state(&mut self) {
        let current = self.connection.state();
        let changed = {
            let mut published = self.state.connection.lock().await;
            let changed = *published != current;
            *published = current;
            changed
        };
        if changed {
            debug!(state = %current, "connection state changed");
            self.observer.on_state_changed(current);
        }
    }

    async fn publish_roster(&mut self) {
        let participants = self.roster.participants().to_vec();
        *self.state.participants.lock().await = participants.clone();
        self.observer.on_roster_changed(&participants);
    }
}

/// Map a transport failure to the disconnect reason it implies.
fn reason_for(error: PartyRoomError) -> DisconnectReason {
    match error {
        PartyRoomError::TransportClosed => DisconnectReason::TransportClose,
        other => DisconnectReason::TransportError(other.to_string()),
    }
}

async fn recv_next(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
