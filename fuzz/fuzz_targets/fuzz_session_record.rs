#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use party_room_client::session::{SessionStore, SESSION_KEY};
use party_room_client::storage::{MemoryStorage, SessionStorage};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    // Arbitrary persisted bytes must load as a record or as nothing, and an
    // unreadable record must not survive the load.
    let storage = Arc::new(MemoryStorage::new());
    let _ = storage.write(SESSION_KEY, raw);
    let store = SessionStore::new(Arc::clone(&storage) as _);
    if store.load().is_none() {
        assert!(matches!(storage.read(SESSION_KEY), Ok(None)));
    }
});
