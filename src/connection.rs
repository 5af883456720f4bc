//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] decides, for every lifecycle input (user connect,
//! transport connected, transport lost, connect error, user disconnect),
//! what state the client is in and whether a reconnect should be scheduled.
//! It performs no I/O itself: the client driver owns the transport and the
//! timer and acts on the returned [`ReconnectStep`].
//!
//! ```text
//! Disconnected --connect()--> Connecting --connected--> Connected
//! Connected --lost (eligible)--> Reconnecting --connected--> Connected
//! Reconnecting --attempts exhausted--> Failed --connect()--> Connecting
//! any --disconnect()--> Disconnected
//! ```

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;

/// Lifecycle state of the client's server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnection attempts were exhausted. Only a manual `connect()` leaves
    /// this state.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a transport connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server deliberately closed the connection.
    ServerDisconnect,
    /// This client deliberately closed the connection.
    ClientDisconnect,
    /// The connection dropped without a close handshake.
    TransportClose,
    /// The transport failed while sending or receiving.
    TransportError(String),
}

impl DisconnectReason {
    /// The conventional reason string for this disconnect.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerDisconnect => "io server disconnect",
            Self::ClientDisconnect => "io client disconnect",
            Self::TransportClose => "transport close",
            Self::TransportError(_) => "transport error",
        }
    }

    /// Deliberate closes never trigger automatic reconnection.
    pub fn is_intentional(&self) -> bool {
        matches!(self, Self::ServerDisconnect | Self::ClientDisconnect)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportError(detail) => write!(f, "transport error: {detail}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What the driver should do after a connection loss or failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    /// Nothing to schedule.
    Idle,
    /// Try again after `delay`. `attempt` is 1-based.
    Retry { attempt: u32, delay: Duration },
    /// The attempt budget is spent; the client is now [`ConnectionState::Failed`].
    Exhausted,
}

/// Connection lifecycle state plus the reconnect attempt counter.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    state: ConnectionState,
    attempt: u32,
    policy: ReconnectPolicy,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts made since the last successful connect.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Handle a user `connect()` request.
    ///
    /// Returns `true` if the caller should open a transport now. Connecting
    /// while already connected (or mid-connect) is a logged no-op. From
    /// [`ConnectionState::Failed`] this is a manual reset of the attempt
    /// counter.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Connected => {
                warn!("connect() called while already connected; ignoring");
                false
            }
            ConnectionState::Connecting => {
                debug!("connect() called while a connect is in progress; ignoring");
                false
            }
            ConnectionState::Failed => {
                info!("manual connect after reconnection failure; resetting attempts");
                self.attempt = 0;
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                self.state = ConnectionState::Connecting;
                true
            }
        }
    }

    /// The transport is up.
    pub fn on_connected(&mut self) {
        if self.attempt > 0 {
            info!(attempts = self.attempt, "reconnected");
        }
        self.state = ConnectionState::Connected;
        self.attempt = 0;
    }

    /// The live transport went away for `reason`.
    pub fn on_disconnected(&mut self, reason: &DisconnectReason) -> ReconnectStep {
        if reason.is_intentional() {
            debug!(%reason, "intentional disconnect; not reconnecting");
            self.state = ConnectionState::Disconnected;
            self.attempt = 0;
            return ReconnectStep::Idle;
        }
        self.schedule_retry()
    }

    /// A connection attempt (initial or retry) failed.
    ///
    /// Only an attempt in progress schedules a retry; a stale error in any
    /// other state is ignored.
    pub fn on_connect_error(&mut self) -> ReconnectStep {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Reconnecting => self.schedule_retry(),
            ConnectionState::Disconnected => ReconnectStep::Idle,
            ConnectionState::Connected | ConnectionState::Failed => {
                debug!(state = %self.state, "connect error with no attempt in progress; ignoring");
                ReconnectStep::Idle
            }
        }
    }

    /// User-directed teardown. Always lands in [`ConnectionState::Disconnected`].
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.attempt = 0;
    }

    fn schedule_retry(&mut self) -> ReconnectStep {
        if self.attempt >= self.policy.max_attempts {
            self.state = ConnectionState::Failed;
            return ReconnectStep::Exhausted;
        }
        self.attempt += 1;
        self.state = ConnectionState::Reconnecting;
        ReconnectStep::Retry {
            attempt: self.attempt,
            delay: self.policy.delay_for(self.attempt),
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
