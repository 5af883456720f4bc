//! Session outcome notifications.
//!
//! The driver reports every outcome the application must react to through an
//! injected [`SessionObserver`]. All methods have empty defaults so an
//! implementation only overrides what it renders. Callbacks run on the
//! driver task and must not block. A panicking callback is logged and
//! skipped; it does not take the driver down.
//!
//! [`ChannelObserver`] adapts the trait to a bounded channel of
//! [`SessionEvent`]s for applications that prefer an event loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::connection::ConnectionState;
use crate::protocol::Participant;
use crate::recovery::RecoveredSession;
use crate::session::SessionRecord;

/// Default capacity of the [`ChannelObserver`] channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Receives session and connection outcomes from the client driver.
pub trait SessionObserver: Send + Sync + 'static {
    /// The connection state changed.
    fn on_state_changed(&self, _state: ConnectionState) {}

    /// A session record was written after a create, join, or recovery.
    fn on_session_saved(&self, _record: &SessionRecord) {}

    /// The server accepted session recovery; the roster has been replaced.
    fn on_recovered(&self, _session: &RecoveredSession) {}

    /// Recovery was rejected (or abandoned); the stored session is gone and
    /// the application should fall back to its join flow.
    fn on_recovery_failed(&self, _reason: &str) {}

    /// Automatic reconnection gave up. Terminal until a manual `connect()`.
    fn on_reconnection_failed(&self) {}

    /// The roster changed; `participants` is in presentation order.
    fn on_roster_changed(&self, _participants: &[Participant]) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Wraps the application's observer so a panic in one callback is contained.
pub(crate) struct GuardedObserver {
    inner: Arc<dyn SessionObserver>,
}

impl GuardedObserver {
    pub(crate) fn new(inner: Arc<dyn SessionObserver>) -> Self {
        Self { inner }
    }

    fn guard(&self, callback: &'static str, f: impl FnOnce(&dyn SessionObserver)) {
        if catch_unwind(AssertUnwindSafe(|| f(self.inner.as_ref()))).is_err() {
            error!(callback, "session observer panicked; continuing");
        }
    }
}

impl SessionObserver for GuardedObserver {
    fn on_state_changed(&self, state: ConnectionState) {
        self.guard("on_state_changed", |o| o.on_state_changed(state));
    }

    fn on_session_saved(&self, record: &SessionRecord) {
        self.guard("on_session_saved", |o| o.on_session_saved(record));
    }

    fn on_recovered(&self, session: &RecoveredSession) {
        self.guard("on_recovered", |o| o.on_recovered(session));
    }

    fn on_recovery_failed(&self, reason: &str) {
        self.guard("on_recovery_failed", |o| o.on_recovery_failed(reason));
    }

    fn on_reconnection_failed(&self) {
        self.guard("on_reconnection_failed", |o| o.on_reconnection_failed());
    }

    fn on_roster_changed(&self, participants: &[Participant]) {
        self.guard("on_roster_changed", |o| o.on_roster_changed(participants));
    }
}

/// A [`SessionObserver`] callback, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    SessionSaved(SessionRecord),
    Recovered(Box<RecoveredSession>),
    RecoveryFailed { reason: String },
    ReconnectionFailed,
    RosterChanged(Vec<Participant>),
}

/// Forwards observer callbacks into a bounded channel.
///
/// When the receiver cannot keep up, events are dropped with a warning
/// rather than stalling the driver.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<SessionEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiver for its events.
    ///
    /// Values below 1 are clamped to 1.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "session event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("session event channel closed, receiver dropped");
            }
        }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_state_changed(&self, state: ConnectionState) {
        self.forward(SessionEvent::StateChanged(state));
    }

    fn on_session_saved(&self, record: &SessionRecord) {
        self.forward(SessionEvent::SessionSaved(record.clone()));
    }

    fn on_recovered(&self, session: &RecoveredSession) {
        self.forward(SessionEvent::Recovered(Box::new(session.clone())));
    }

    fn on_recovery_failed(&self, reason: &str) {
        self.forward(SessionEvent::RecoveryFailed {
            reason: reason.to_owned(),
        });
    }

    fn on_reconnection_failed(&self) {
        self.forward(SessionEvent::ReconnectionFailed);
    }

    fn on_roster_changed(&self, participants: &[Participant]) {
        self.forward(SessionEvent::RosterChanged(participants.to_vec()));
    }
}
