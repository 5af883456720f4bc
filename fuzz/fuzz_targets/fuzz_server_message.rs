#![no_main]

use libfuzzer_sys::fuzz_target;
use party_room_client::protocol::ServerMessage;
use party_room_client::roster::RosterReconciler;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) else {
        return;
    };

    // Whatever decodes must apply to a roster without panicking, and the
    // result must stay free of duplicate ids.
    let mut roster = RosterReconciler::new();
    roster.apply_message(&msg);
    let mut ids: Vec<&str> = roster.participants().iter().map(|p| p.id.as_str()).collect();
    let len = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), len);
});
