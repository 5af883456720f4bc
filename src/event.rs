//! Inbound events and the listener registry behind `on` / `off`.
//!
//! Every event the driver processes, whether a transport lifecycle change
//! or a decoded [`ServerMessage`], is delivered to the listeners registered
//! for its [`EventKind`], in arrival order, on the driver task.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};

use crate::connection::DisconnectReason;
use crate::protocol::ServerMessage;

/// The name under which an inbound event is delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    ConnectError,
    RoomCreated,
    RoomJoined,
    SessionRecovered,
    SessionRecoveryFailed,
    ParticipantJoined,
    ParticipantLeft,
    ParticipantMicUpdated,
    MicUpdated,
    ParticipantDisconnected,
    Error,
}

impl EventKind {
    /// The event name as it appears on the wire (lifecycle events use the
    /// transport's conventional names).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ConnectError => "connect_error",
            Self::RoomCreated => "room-created",
            Self::RoomJoined => "room-joined",
            Self::SessionRecovered => "session-recovered",
            Self::SessionRecoveryFailed => "session-recovery-failed",
            Self::ParticipantJoined => "participant-joined",
            Self::ParticipantLeft => "participant-left",
            Self::ParticipantMicUpdated => "participant-mic-updated",
            Self::MicUpdated => "mic-updated",
            Self::ParticipantDisconnected => "participant-disconnected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event observed by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A transport connection was established.
    Connect,
    /// The transport connection ended.
    Disconnect { reason: DisconnectReason },
    /// A connection attempt failed.
    ConnectError { error: String },
    /// A decoded server message.
    Message(ServerMessage),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect => EventKind::Connect,
            Self::Disconnect { .. } => EventKind::Disconnect,
            Self::ConnectError { .. } => EventKind::ConnectError,
            Self::Message(msg) => msg.kind(),
        }
    }
}

/// Handle returned by [`Listeners::on`], used to unregister the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

struct Entry {
    id: ListenerId,
    kind: EventKind,
    handler: Handler,
}

/// Registry of event listeners shared by the client handle and the driver.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Entry {
            id,
            kind,
            handler: Arc::new(handler),
        });
        debug!(%kind, ?id, "listener registered");
        id
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener registered for its kind, in
    /// registration order. Returns the number of listeners invoked.
    ///
    /// Handlers run outside the registry lock, so they may call `on`/`off`.
    /// A panicking handler is logged and skipped.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .lock()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        for handler in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(%kind, "event listener panicked; continuing");
            }
        }
        handlers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}
