//! Post-connect session recovery.
//!
//! After every transition into `Connected`, [`RecoveryCoordinator::begin`]
//! checks the [`SessionStore`] and, if a live record exists, produces a single
//! `recover-session` request. The server answers with `session-recovered`
//! ([`complete`](RecoveryCoordinator::complete)) or `session-recovery-failed`
//! ([`fail`](RecoveryCoordinator::fail)).
//!
//! At most one attempt is in flight, and it is bound to the connection that
//! carried the request: when that connection is lost, or the session ends,
//! the driver calls [`reset`](RecoveryCoordinator::reset). The coordinator has
//! no timeout of its own: an embedding application that needs a deadline
//! calls [`abandon`](RecoveryCoordinator::abandon) when it expires.

use tracing::{debug, info, warn};

use crate::observer::SessionObserver;
use crate::protocol::{ClientMessage, Participant, RoomInfo, SessionRecoveredPayload};
use crate::roster::RosterReconciler;
use crate::session::{SessionRecord, SessionStore};

/// Reason reported to the observer when an attempt is abandoned.
pub const ABANDONED_REASON: &str = "session recovery timed out";

/// The outcome of a successful recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredSession {
    /// The refreshed record, carrying the new connection id.
    pub record: SessionRecord,
    pub room: RoomInfo,
    pub participants: Vec<Participant>,
}

/// Tracks the single in-flight recovery attempt.
#[derive(Debug, Default)]
pub struct RecoveryCoordinator {
    pending: Option<SessionRecord>,
}

impl RecoveryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a recovery request is awaiting the server's answer.
    pub fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// The record the in-flight attempt is recovering.
    pub fn pending(&self) -> Option<&SessionRecord> {
        self.pending.as_ref()
    }

    /// Called on every transition into `Connected`.
    ///
    /// Returns the `recover-session` request to send, or `None` when nothing
    /// is stored or an attempt is already in flight.
    pub fn begin(&mut self, store: &SessionStore) -> Option<ClientMessage> {
        if let Some(pending) = &self.pending {
            debug!(
                room_code = %pending.room_code,
                "recovery already in flight; not sending another request"
            );
            return None;
        }

        let Some(record) = store.load() else {
            debug!("no stored session; skipping recovery");
            return None;
        };

        info!(
            room_code = %record.room_code,
            username = %record.username,
            "attempting session recovery"
        );
        let request = ClientMessage::RecoverSession {
            room_code: record.room_code.clone(),
            username: record.username.clone(),
            is_host: record.is_host,
            previous_socket_id: record.connection_id.clone(),
        };
        self.pending = Some(record);
        Some(request)
    }

    /// Handle `session-recovered`.
    ///
    /// Re-saves the session under the new connection id, replaces the roster
    /// with the server's snapshot, and notifies the observer. The new id is
    /// taken from the payload's `user`, else `transport_id`, else the
    /// snapshot entry whose username matches the stored one.
    ///
    /// Returns `None` (and changes nothing) if no attempt was in flight.
    pub fn complete(
        &mut self,
        payload: &SessionRecoveredPayload,
        transport_id: Option<&str>,
        store: &SessionStore,
        roster: &mut RosterReconciler,
        observer: &dyn SessionObserver,
    ) -> Option<RecoveredSession> {
        let Some(previous) = self.pending.take() else {
            warn!("received session-recovered with no recovery in flight; ignoring");
            return None;
        };

        let own_entry = payload.user.as_ref().or_else(|| {
            payload
                .participants
                .iter()
                .find(|p| transport_id == Some(p.id.as_str()))
                .or_else(|| {
                    payload
                        .participants
                        .iter()
                        .find(|p| p.username == previous.username)
                })
        });

        let connection_id = payload
            .user
            .as_ref()
            .map(|user| user.id.clone())
            .or_else(|| transport_id.map(str::to_owned))
            .or_else(|| own_entry.map(|p| p.id.clone()))
            .unwrap_or_else(|| {
                warn!("could not determine new connection id; keeping the previous one");
                previous.connection_id.clone()
            });

        let room_code = payload
            .room_code
            .clone()
            .or_else(|| payload.room.code.clone())
            .unwrap_or_else(|| previous.room_code.clone());
        let is_host = own_entry.map_or(previous.is_host, |p| p.is_host);

        let record = SessionRecord::new(room_code, previous.username, is_host, connection_id);
        match store.save_record(&record) {
            Ok(()) => observer.on_session_saved(&record),
            Err(e) => warn!("failed to persist recovered session: {e}"),
        }

        roster.set_participants(payload.participants.clone());

        info!(
            room_code = %record.room_code,
            connection_id = %record.connection_id,
            participants = payload.participants.len(),
            "session recovered"
        );
        let recovered = RecoveredSession {
            record,
            room: payload.room.clone(),
            participants: roster.participants().to_vec(),
        };
        observer.on_recovered(&recovered);
        Some(recovered)
    }

    /// Handle `session-recovery-failed`: clear the stored session and tell
    /// the observer to fall back to the join flow.
    ///
    /// Returns `false` (and changes nothing) if no attempt was in flight.
    pub fn fail(
        &mut self,
        error: &str,
        store: &SessionStore,
        observer: &dyn SessionObserver,
    ) -> bool {
        let Some(previous) = self.pending.take() else {
            warn!(%error, "received session-recovery-failed with no recovery in flight; ignoring");
            return false;
        };
        warn!(room_code = %previous.room_code, %error, "session recovery failed");
        self.give_up(error, store, observer);
        true
    }

    /// Resolve the in-flight attempt as failed because the caller's deadline
    /// expired. A late server answer is then ignored.
    ///
    /// Returns `false` if no attempt was in flight.
    pub fn abandon(&mut self, store: &SessionStore, observer: &dyn SessionObserver) -> bool {
        let Some(previous) = self.pending.take() else {
            return false;
        };
        warn!(room_code = %previous.room_code, "abandoning session recovery");
        self.give_up(ABANDONED_REASON, store, observer);
        true
    }

    /// Drop the in-flight attempt without reporting anything.
    ///
    /// Used when the connection the request went out on is gone, or the
    /// session it belongs to has ended. The next connect transition may
    /// then send a fresh request for whatever is stored at that point.
    pub fn reset(&mut self) -> bool {
        match self.pending.take() {
            Some(previous) => {
                debug!(room_code = %previous.room_code, "discarding in-flight recovery");
                true
            }
            None => false,
        }
    }

    fn give_up(&self, reason: &str, store: &SessionStore, observer: &dyn SessionObserver) {
        if let Err(e) = store.clear() {
            warn!("failed to clear session after recovery failure: {e}");
        }
        observer.on_recovery_failed(reason);
    }
}
