#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the party room client.
//!
//! Verifies that every `ClientMessage` encodes to the exact `{event, data}`
//! shape the server expects, and that JSON fixtures matching real server
//! output decode into the right `ServerMessage` variants.

use party_room_client::protocol::{
    ClientMessage, DeltaKind, Participant, ParticipantPatch, RosterPayload, ServerMessage,
};
use party_room_client::{EventKind, SessionRecord};
use serde_json::json;

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

fn decode(value: serde_json::Value) -> ServerMessage {
    serde_json::from_value(value).expect("decode server message")
}

fn encode(msg: &ClientMessage) -> serde_json::Value {
    serde_json::to_value(msg).expect("encode client message")
}

// ════════════════════════════════════════════════════════════════════
// ClientMessage wire shape
// ════════════════════════════════════════════════════════════════════

#[test]
fn create_room_wire_shape() {
    let msg = ClientMessage::CreateRoom {
        username: "Hana".into(),
    };
    assert_eq!(
        encode(&msg),
        json!({ "event": "create-room", "data": { "username": "Hana" } })
    );
    assert_eq!(msg.name(), "create-room");
}

#[test]
fn join_room_wire_shape() {
    let msg = ClientMessage::JoinRoom {
        room_code: "ABC123".into(),
        username: "Alice".into(),
    };
    assert_eq!(
        encode(&msg),
        json!({ "event": "join-room", "data": { "roomCode": "ABC123", "username": "Alice" } })
    );
}

#[test]
fn recover_session_wire_shape() {
    let msg = ClientMessage::RecoverSession {
        room_code: "ABC123".into(),
        username: "Alice".into(),
        is_host: false,
        previous_socket_id: "old-socket".into(),
    };
    assert_eq!(
        encode(&msg),
        json!({
            "event": "recover-session",
            "data": {
                "roomCode": "ABC123",
                "username": "Alice",
                "isHost": false,
                "previousSocketId": "old-socket"
            }
        })
    );
}

#[test]
fn leave_and_toggle_mic_wire_shape() {
    assert_eq!(
        encode(&ClientMessage::LeaveRoom {
            room_code: "ABC123".into()
        }),
        json!({ "event": "leave-room", "data": { "roomCode": "ABC123" } })
    );
    assert_eq!(
        encode(&ClientMessage::ToggleMic {
            room_code: "ABC123".into(),
            mic_muted: true,
        }),
        json!({ "event": "toggle-mic", "data": { "roomCode": "ABC123", "micMuted": true } })
    );
}

// ════════════════════════════════════════════════════════════════════
// ServerMessage fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn room_created_fixture() {
    let msg = decode(json!({
        "event": "room-created",
        "data": {
            "roomCode": "XYZ789",
            "user": { "id": "s1", "username": "Hana", "isHost": true },
            "room": { "code": "XYZ789", "hostId": "s1", "movieUrl": "https://example.com/a.mp4" }
        }
    }));
    let ServerMessage::RoomCreated(payload) = msg else {
        panic!("expected RoomCreated");
    };
    assert_eq!(payload.room_code, "XYZ789");
    assert_eq!(
        payload.user,
        Participant::new("s1").with_username("Hana").with_host(true)
    );
    assert_eq!(payload.room.host_id.as_deref(), Some("s1"));
    assert_eq!(
        payload.room.extra.get("movieUrl"),
        Some(&json!("https://example.com/a.mp4"))
    );
    assert!(payload.room.participants.is_none());
}

#[test]
fn room_joined_fixture() {
    let msg = decode(json!({
        "event": "room-joined",
        "data": {
            "roomCode": "ABC123",
            "user": { "id": "s2", "username": "Alice" },
            "participants": [
                { "id": "s1", "username": "Hana", "isHost": true, "micMuted": false },
                { "id": "s2", "username": "Alice", "isHost": false, "micMuted": true }
            ]
        }
    }));
    assert_eq!(msg.kind(), EventKind::RoomJoined);
    let ServerMessage::RoomJoined(payload) = msg else {
        panic!("expected RoomJoined");
    };
    assert_eq!(payload.user.id, "s2");
    assert_eq!(payload.participants.len(), 2);
    assert!(payload.participants[1].mic_muted);
}

#[test]
fn session_recovered_fixture_with_minimal_payload() {
    let msg = decode(json!({
        "event": "session-recovered",
        "data": { "participants": [{ "id": "s1", "username": "Alice" }] }
    }));
    let ServerMessage::SessionRecovered(payload) = msg else {
        panic!("expected SessionRecovered");
    };
    assert!(payload.room_code.is_none());
    assert!(payload.user.is_none());
    assert_eq!(payload.participants, vec![Participant::new("s1").with_username("Alice")]);
}

#[test]
fn session_recovery_failed_fixture() {
    assert_eq!(
        decode(json!({ "event": "session-recovery-failed", "data": { "error": "Room not found" } })),
        ServerMessage::SessionRecoveryFailed {
            error: "Room not found".into()
        }
    );
    // The reason is optional on the wire.
    assert_eq!(
        decode(json!({ "event": "session-recovery-failed", "data": {} })),
        ServerMessage::SessionRecoveryFailed {
            error: String::new()
        }
    );
}

#[test]
fn error_fixture() {
    let msg = decode(json!({ "event": "error", "data": { "message": "Room is full" } }));
    assert_eq!(msg.kind(), EventKind::Error);
    assert!(msg.roster_update().is_none());
}

#[test]
fn unknown_event_is_rejected() {
    let result: Result<ServerMessage, _> =
        serde_json::from_value(json!({ "event": "movie-changed", "data": {} }));
    assert!(result.is_err());
}

// ════════════════════════════════════════════════════════════════════
// Roster payloads
// ════════════════════════════════════════════════════════════════════

#[test]
fn participant_joined_delta_fixture() {
    let msg = decode(json!({
        "event": "participant-joined",
        "data": { "participant": { "id": "c1", "username": "Carol" } }
    }));
    let (kind, payload) = msg.roster_update().expect("roster event");
    assert_eq!(kind, DeltaKind::Merge);
    assert_eq!(
        payload,
        &RosterPayload::Delta(ParticipantPatch::new("c1").with_username("Carol"))
    );
}

#[test]
fn participant_left_snapshot_fixture() {
    let msg = decode(json!({
        "event": "participant-left",
        "data": { "participants": [{ "id": "s1", "username": "Hana", "isHost": true }] }
    }));
    let (kind, payload) = msg.roster_update().expect("roster event");
    assert_eq!(kind, DeltaKind::Remove);
    assert!(matches!(payload, RosterPayload::Snapshot(list) if list.len() == 1));
}

#[test]
fn mic_events_map_to_merge_and_disconnects_to_remove() {
    let delta = json!({ "participant": { "id": "a", "micMuted": true } });
    for (event, expected) in [
        ("participant-mic-updated", DeltaKind::Merge),
        ("mic-updated", DeltaKind::Merge),
        ("participant-disconnected", DeltaKind::Remove),
    ] {
        let msg = decode(json!({ "event": event, "data": delta.clone() }));
        assert_eq!(msg.kind().as_str(), event);
        assert_eq!(msg.roster_update().map(|(kind, _)| kind), Some(expected));
    }
}

#[test]
fn roster_event_without_roster_fields_is_empty() {
    let msg = decode(json!({ "event": "participant-joined", "data": { "count": 3 } }));
    assert_eq!(msg.roster_update().map(|(_, p)| p), Some(&RosterPayload::Empty));
}

#[test]
fn roster_payload_serializes_back_to_wire_fields() {
    let snapshot = serde_json::to_value(RosterPayload::Snapshot(vec![Participant::new("a")]))
        .expect("serialize");
    assert_eq!(snapshot["participants"][0]["id"], "a");
    assert!(snapshot.get("participant").is_none());

    let empty = serde_json::to_value(RosterPayload::Empty).expect("serialize");
    assert_eq!(empty, json!({}));
}

// ════════════════════════════════════════════════════════════════════
// Persisted session layout
// ════════════════════════════════════════════════════════════════════

#[test]
fn session_record_layout() {
    let record: SessionRecord = serde_json::from_value(json!({
        "roomCode": "ABC123",
        "username": "Alice",
        "isHost": false,
        "timestamp": 1_700_000_000_000u64,
        "socketId": "old-socket"
    }))
    .expect("decode record");
    assert_eq!(record.connection_id, "old-socket");
    assert_eq!(record.timestamp, 1_700_000_000_000);

    let value = serde_json::to_value(&record).expect("encode record");
    assert_eq!(value["socketId"], "old-socket");
    assert_eq!(value["roomCode"], "ABC123");
}
