//! Wire-compatible protocol types for the party room server.
//!
//! Every message travels as a JSON object with an `event` name and a `data`
//! payload, e.g. `{"event":"room-joined","data":{...}}`. Payload fields use
//! `camelCase` to match the server.
//!
//! Roster-affecting events carry either a full participant list (a snapshot)
//! or a single participant record (a delta). [`RosterPayload`] resolves that
//! choice once, at decode time: when a payload carries both, the snapshot
//! wins.

use serde::{Deserialize, Serialize};

use crate::event::EventKind;

// ── Type aliases ────────────────────────────────────────────────────

/// Connection-scoped participant identifier assigned by the server.
///
/// Not stable across reconnects: a recovered participant gets a new id.
pub type ParticipantId = String;

// ── Participants ────────────────────────────────────────────────────

/// A participant as declared by the server.
///
/// Fields other than `id` fall back to their defaults when absent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default, alias = "muted")]
    pub mic_muted: bool,
}

impl Participant {
    /// Create a participant with the given id and default fields.
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            username: String::new(),
            is_host: false,
            mic_muted: false,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Mark the participant as host (or not).
    #[must_use]
    pub fn with_host(mut self, is_host: bool) -> Self {
        self.is_host = is_host;
        self
    }

    /// Set the microphone mute flag.
    #[must_use]
    pub fn with_mic_muted(mut self, mic_muted: bool) -> Self {
        self.mic_muted = mic_muted;
        self
    }
}

/// A partial participant record carried by delta events.
///
/// Only `id` is required. `None` fields mean "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPatch {
    pub id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_host: Option<bool>,
    #[serde(default, alias = "muted", skip_serializing_if = "Option::is_none")]
    pub mic_muted: Option<bool>,
}

impl ParticipantPatch {
    /// Create a patch that only identifies a participant.
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, is_host: bool) -> Self {
        self.is_host = Some(is_host);
        self
    }

    #[must_use]
    pub fn with_mic_muted(mut self, mic_muted: bool) -> Self {
        self.mic_muted = Some(mic_muted);
        self
    }

    /// Apply the present fields of this patch onto `participant`.
    pub fn merge_into(&self, participant: &mut Participant) {
        if let Some(username) = &self.username {
            participant.username.clone_from(username);
        }
        if let Some(is_host) = self.is_host {
            participant.is_host = is_host;
        }
        if let Some(mic_muted) = self.mic_muted {
            participant.mic_muted = mic_muted;
        }
    }
}

impl From<Participant> for ParticipantPatch {
    fn from(participant: Participant) -> Self {
        Self {
            id: participant.id,
            username: Some(participant.username),
            is_host: Some(participant.is_host),
            mic_muted: Some(participant.mic_muted),
        }
    }
}

// ── Room ────────────────────────────────────────────────────────────

/// Room details as sent by the server.
///
/// Only the fields this client acts on are typed; everything else the server
/// includes (playback settings, movie metadata, ...) is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<Participant>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Roster payloads ─────────────────────────────────────────────────

/// The roster content of a roster-affecting event.
///
/// Decoded from `{participants: [...]}` (snapshot), `{participant: {...}}`
/// (delta), or neither (empty). A payload carrying both decodes as a
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRosterPayload", into = "RawRosterPayload")]
pub enum RosterPayload {
    /// Complete replacement roster.
    Snapshot(Vec<Participant>),
    /// Single-participant incremental update.
    Delta(ParticipantPatch),
    /// Neither field was present; the event carries no roster information.
    Empty,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawRosterPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    participants: Option<Vec<Participant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    participant: Option<ParticipantPatch>,
}

impl From<RawRosterPayload> for RosterPayload {
    fn from(raw: RawRosterPayload) -> Self {
        match (raw.participants, raw.participant) {
            (Some(participants), _) => Self::Snapshot(participants),
            (None, Some(participant)) => Self::Delta(participant),
            (None, None) => Self::Empty,
        }
    }
}

impl From<RosterPayload> for RawRosterPayload {
    fn from(payload: RosterPayload) -> Self {
        match payload {
            RosterPayload::Snapshot(participants) => Self {
                participants: Some(participants),
                participant: None,
            },
            RosterPayload::Delta(participant) => Self {
                participants: None,
                participant: Some(participant),
            },
            RosterPayload::Empty => Self::default(),
        }
    }
}

/// How a delta payload should be applied for a given event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// Join and mic updates: merge into the existing entry.
    Merge,
    /// Leave and disconnect: drop the entry.
    Remove,
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for the `room-created` server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedPayload {
    pub room_code: String,
    /// The creating user; `user.id` is this client's connection id.
    pub user: Participant,
    #[serde(default)]
    pub room: RoomInfo,
}

/// Payload for the `room-joined` server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinedPayload {
    pub room_code: String,
    /// The joining user; `user.id` is this client's connection id.
    pub user: Participant,
    #[serde(default)]
    pub room: RoomInfo,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

/// Payload for the `session-recovered` server message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecoveredPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_code: Option<String>,
    #[serde(default)]
    pub room: RoomInfo,
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// The recovered user as re-registered by the server, if included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Participant>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Create a new room hosted by this user.
    CreateRoom { username: String },
    /// Join an existing room by code.
    JoinRoom { room_code: String, username: String },
    /// Re-associate this connection with a previous room membership.
    RecoverSession {
        room_code: String,
        username: String,
        is_host: bool,
        previous_socket_id: String,
    },
    /// Leave the current room.
    LeaveRoom { room_code: String },
    /// Mute or unmute this user's microphone.
    ToggleMic { room_code: String, mic_muted: bool },
}

impl ClientMessage {
    /// The wire event name of this message.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "create-room",
            Self::JoinRoom { .. } => "join-room",
            Self::RecoverSession { .. } => "recover-session",
            Self::LeaveRoom { .. } => "leave-room",
            Self::ToggleMic { .. } => "toggle-mic",
        }
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// A room was created for this client (boxed to reduce enum size).
    RoomCreated(Box<RoomCreatedPayload>),
    /// This client joined a room (boxed to reduce enum size).
    RoomJoined(Box<RoomJoinedPayload>),
    /// The server accepted a `recover-session` request (boxed to reduce enum size).
    SessionRecovered(Box<SessionRecoveredPayload>),
    /// The server rejected a `recover-session` request.
    SessionRecoveryFailed {
        #[serde(default)]
        error: String,
    },
    /// Someone joined the room.
    ParticipantJoined(RosterPayload),
    /// Someone left the room.
    ParticipantLeft(RosterPayload),
    /// Another participant's microphone state changed.
    ParticipantMicUpdated(RosterPayload),
    /// This client's microphone state change was echoed back.
    MicUpdated(RosterPayload),
    /// Someone lost their connection.
    ParticipantDisconnected(RosterPayload),
    /// Generic server-side error (e.g. join rejected).
    Error { message: String },
}

impl ServerMessage {
    /// The listener kind this message is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RoomCreated(_) => EventKind::RoomCreated,
            Self::RoomJoined(_) => EventKind::RoomJoined,
            Self::SessionRecovered(_) => EventKind::SessionRecovered,
            Self::SessionRecoveryFailed { .. } => EventKind::SessionRecoveryFailed,
            Self::ParticipantJoined(_) => EventKind::ParticipantJoined,
            Self::ParticipantLeft(_) => EventKind::ParticipantLeft,
            Self::ParticipantMicUpdated(_) => EventKind::ParticipantMicUpdated,
            Self::MicUpdated(_) => EventKind::MicUpdated,
            Self::ParticipantDisconnected(_) => EventKind::ParticipantDisconnected,
            Self::Error { .. } => EventKind::Error,
        }
    }

    /// The roster payload of a roster-affecting event, with the delta
    /// semantics that event implies. `None` for every other message.
    pub fn roster_update(&self) -> Option<(DeltaKind, &RosterPayload)> {
        match self {
            Self::ParticipantJoined(payload)
            | Self::ParticipantMicUpdated(payload)
            | Self::MicUpdated(payload) => Some((DeltaKind::Merge, payload)),
            Self::ParticipantLeft(payload) | Self::ParticipantDisconnected(payload) => {
                Some((DeltaKind::Remove, payload))
            }
            Self::RoomCreated(_)
            | Self::RoomJoined(_)
            | Self::SessionRecovered(_)
            | Self::SessionRecoveryFailed { .. }
            | Self::Error { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roster_payload_prefers_snapshot_over_delta() {
        let payload: RosterPayload = serde_json::from_value(json!({
            "participants": [{"id": "b"}],
            "participant": {"id": "a", "micMuted": true}
        }))
        .unwrap();
        assert_eq!(payload, RosterPayload::Snapshot(vec![Participant::new("b")]));
    }

    #[test]
    fn roster_payload_without_fields_is_empty() {
        let payload: RosterPayload = serde_json::from_value(json!({"other": 1})).unwrap();
        assert_eq!(payload, RosterPayload::Empty);
    }

    #[test]
    fn patch_accepts_short_muted_alias() {
        let patch: ParticipantPatch =
            serde_json::from_value(json!({"id": "A", "muted": true})).unwrap();
        assert_eq!(patch.mic_muted, Some(true));
        assert!(patch.username.is_none());
    }

    #[test]
    fn merge_keeps_absent_fields() {
        let mut existing = Participant::new("A").with_username("a");
        ParticipantPatch::new("A")
            .with_mic_muted(true)
            .merge_into(&mut existing);
        assert_eq!(
            existing,
            Participant::new("A").with_username("a").with_mic_muted(true)
        );
    }

    #[test]
    fn roster_update_maps_event_semantics() {
        let payload = RosterPayload::Delta(ParticipantPatch::new("x"));
        let left = ServerMessage::ParticipantLeft(payload.clone());
        let mic = ServerMessage::MicUpdated(payload);
        assert!(matches!(left.roster_update(), Some((DeltaKind::Remove, _))));
        assert!(matches!(mic.roster_update(), Some((DeltaKind::Merge, _))));
        let err = ServerMessage::Error {
            message: "nope".into(),
        };
        assert!(err.roster_update().is_none());
    }

    #[test]
    fn room_info_keeps_unknown_fields() {
        let room: RoomInfo = serde_json::from_value(json!({
            "code": "ABC123",
            "hostId": "h1",
            "movie": {"title": "Heat"}
        }))
        .unwrap();
        assert_eq!(room.code.as_deref(), Some("ABC123"));
        assert_eq!(room.host_id.as_deref(), Some("h1"));
        assert!(room.participants.is_none());
        assert_eq!(room.extra.get("movie"), Some(&json!({"title": "Heat"})));
    }
}
