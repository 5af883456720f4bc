//! The persisted "room I believe I'm in" record.
//!
//! [`SessionStore`] keeps at most one [`SessionRecord`] under a fixed key in
//! a [`SessionStorage`] backend. Writes are last-write-wins with no
//! versioning. Reads past the TTL, or of a record that no longer parses,
//! behave as if nothing was stored and delete the stale value.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::{MemoryStorage, SessionStorage};

/// Storage key of the session record.
pub const SESSION_KEY: &str = "party_session";

/// Records older than this are discarded on read.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_millis(1_800_000);

/// The persisted session.
///
/// Serialized as `{roomCode, username, isHost, timestamp, socketId}` with
/// `timestamp` in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub room_code: String,
    pub username: String,
    pub is_host: bool,
    pub timestamp: u64,
    #[serde(rename = "socketId")]
    pub connection_id: String,
}

impl SessionRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        room_code: impl Into<String>,
        username: impl Into<String>,
        is_host: bool,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            room_code: room_code.into(),
            username: username.into(),
            is_host,
            timestamp: now_millis(),
            connection_id: connection_id.into(),
        }
    }

    /// Whether the record is older than `ttl` at `now_ms`.
    ///
    /// Timestamps in the future count as fresh.
    pub fn is_expired_at(&self, now_ms: u64, ttl: Duration) -> bool {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        now_ms.saturating_sub(self.timestamp) > ttl_ms
    }
}

/// Single-record durable session store with TTL expiry.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            storage,
            ttl: DEFAULT_SESSION_TTL,
        }
    }

    /// A store backed by [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Override the record TTL (defaults to 30 minutes).
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Upsert the record with the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be serialized or persisted.
    pub fn save(
        &self,
        room_code: impl Into<String>,
        username: impl Into<String>,
        is_host: bool,
        connection_id: impl Into<String>,
    ) -> Result<SessionRecord> {
        let record = SessionRecord::new(room_code, username, is_host, connection_id);
        self.save_record(&record)?;
        Ok(record)
    }

    /// Persist `record` as-is, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be serialized or persisted.
    pub fn save_record(&self, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.storage.write(SESSION_KEY, &json)?;
        debug!(room_code = %record.room_code, "session saved");
        Ok(())
    }

    /// The stored record, if present, parseable, and within the TTL.
    pub fn load(&self) -> Option<SessionRecord> {
        self.load_at(now_millis())
    }

    /// [`load`](Self::load) evaluated at an explicit epoch-millisecond time.
    pub fn load_at(&self, now_ms: u64) -> Option<SessionRecord> {
        let raw = match self.storage.read(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("failed to read stored session: {e}");
                return None;
            }
        };

        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) if record.is_expired_at(now_ms, self.ttl) => {
                debug!(room_code = %record.room_code, "stored session expired; clearing");
                self.discard();
                None
            }
            Ok(record) => Some(record),
            Err(e) => {
                warn!("stored session is unreadable; clearing: {e}");
                self.discard();
                None
            }
        }
    }

    /// Delete the record unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not be modified.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove(SESSION_KEY)?;
        debug!("session cleared");
        Ok(())
    }

    fn discard(&self) {
        if let Err(e) = self.storage.remove(SESSION_KEY) {
            warn!("failed to remove stale session: {e}");
        }
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
