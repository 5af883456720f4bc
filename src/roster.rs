//! Local cache of the room's participants.
//!
//! The server is the only source of roster truth. [`RosterReconciler`]
//! applies what it declares: snapshots replace the whole roster, deltas
//! merge or remove one entry. Every operation is idempotent, so replays and
//! duplicate deliveries converge to the same roster.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::protocol::{DeltaKind, Participant, ParticipantPatch, RosterPayload, ServerMessage};

/// Participants keyed by id, plus a presentation-ordered read model.
#[derive(Debug, Clone, Default)]
pub struct RosterReconciler {
    entries: HashMap<String, Participant>,
    ordered: Vec<Participant>,
}

impl RosterReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire roster. Later duplicates of an id win.
    pub fn set_participants(&mut self, participants: Vec<Participant>) {
        self.entries = participants
            .into_iter()
            .map(|participant| (participant.id.clone(), participant))
            .collect();
        self.reorder();
    }

    /// Merge `patch` into the entry with the same id, creating it if new.
    /// Fields absent from the patch keep their cached values.
    pub fn upsert(&mut self, patch: ParticipantPatch) {
        let entry = self
            .entries
            .entry(patch.id.clone())
            .or_insert_with(|| Participant::new(patch.id.clone()));
        patch.merge_into(entry);
        self.reorder();
    }

    /// Remove the entry for `id`. Returns `false` (and changes nothing) if
    /// it was not present.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.entries.remove(id).is_none() {
            return false;
        }
        self.reorder();
        true
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ordered.clear();
    }

    /// Apply a roster payload with the given delta semantics.
    ///
    /// Returns `true` if the roster was touched.
    pub fn apply(&mut self, delta: DeltaKind, payload: &RosterPayload) -> bool {
        match (payload, delta) {
            (RosterPayload::Snapshot(participants), _) => {
                self.set_participants(participants.clone());
                true
            }
            (RosterPayload::Delta(patch), DeltaKind::Merge) => {
                self.upsert(patch.clone());
                true
            }
            (RosterPayload::Delta(patch), DeltaKind::Remove) => self.remove(&patch.id),
            (RosterPayload::Empty, _) => {
                warn!("roster event carried neither participants nor participant; ignoring");
                false
            }
        }
    }

    /// Apply a server message if it is roster-affecting.
    ///
    /// Returns `true` if the roster was touched.
    pub fn apply_message(&mut self, msg: &ServerMessage) -> bool {
        match msg.roster_update() {
            Some((delta, payload)) => {
                debug!(event = %msg.kind(), "reconciling roster");
                self.apply(delta, payload)
            }
            None => false,
        }
    }

    /// Participants in presentation order: host first, then by username,
    /// then by id.
    pub fn participants(&self) -> &[Participant] {
        &self.ordered
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.entries.get(id)
    }

    /// The first participant flagged as host, if any.
    pub fn host(&self) -> Option<&Participant> {
        self.ordered.iter().find(|participant| participant.is_host)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn reorder(&mut self) {
        let mut ordered: Vec<Participant> = self.entries.values().cloned().collect();
        ordered.sort_by(presentation_order);
        self.ordered = ordered;

        let hosts = self.ordered.iter().filter(|p| p.is_host).count();
        if !self.ordered.is_empty() && hosts != 1 {
            debug!(hosts, "roster does not have exactly one host");
        }
    }
}

fn presentation_order(a: &Participant, b: &Participant) -> Ordering {
    b.is_host
        .cmp(&a.is_host)
        .then_with(|| a.username.cmp(&b.username))
        .then_with(|| a.id.cmp(&b.id))
}
