//! Snapshot records — write-time audit trail of derived state.
//!
//! A snapshot materializes the `PlayerState` computed right after a
//! specific event was recorded. Snapshots are never read back into the
//! reducer and never mutated.

use serde::{Deserialize, Serialize};

use progression_kernel::hashing::canonical_hash;
use progression_kernel::PlayerState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    /// Event after which the state was captured.
    pub event_id: String,
    pub state: PlayerState,
    /// SHA-256 of the canonical serialization of `state`.
    pub state_hash: String,
}

impl Snapshot {
    pub fn capture(id: String, timestamp: i64, event_id: &str, state: PlayerState) -> Self {
        let state_hash = canonical_hash(&state);
        Self {
            id,
            timestamp,
            event_id: event_id.to_string(),
            state,
            state_hash,
        }
    }
}

/// True if the stored hash matches the stored state.
pub fn verify_snapshot_hash(snap: &Snapshot) -> bool {
    canonical_hash(&snap.state) == snap.state_hash
}
