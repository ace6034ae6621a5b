//! Replay orchestrator — rebuild derived state from the event log.
//!
//! Delegates all scoring to the kernel. No shortcuts, no cached state:
//! snapshots are never consulted here.

use progression_kernel::hashing::canonical_hash_with_breakdown;
use progression_kernel::invariants::validate_ladder;
use progression_kernel::reducer::accumulate;
use progression_kernel::{
    Breakdown, ConfigurationError, FoldStats, PlayerState, ReduceOptions, RuleIndex, XpEvent,
};

/// Everything one replay produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub state: PlayerState,
    pub breakdown: Breakdown,
    pub stats: FoldStats,
    /// Canonical hash over state and breakdown.
    pub hash: String,
}

/// Rebuild state and breakdown from `events` in one fold.
pub fn rebuild(
    events: &[XpEvent],
    index: &RuleIndex<'_>,
    options: &ReduceOptions,
) -> Result<Replay, ConfigurationError> {
    validate_ladder(&options.level_thresholds)?;
    let acc = accumulate(events, index);
    let state = acc.state(options)?;
    let stats = acc.stats();
    let breakdown = acc.into_breakdown();
    let hash = canonical_hash_with_breakdown(&state, &breakdown);
    Ok(Replay {
        state,
        breakdown,
        stats,
        hash,
    })
}

/// Hashes from two independent replays of the same input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismCheck {
    pub first: String,
    pub second: String,
}

impl DeterminismCheck {
    pub fn holds(&self) -> bool {
        self.first == self.second
    }
}

/// Replay the same events twice and compare canonical hashes.
pub fn verify_determinism(
    events: &[XpEvent],
    index: &RuleIndex<'_>,
    options: &ReduceOptions,
) -> Result<DeterminismCheck, ConfigurationError> {
    Ok(DeterminismCheck {
        first: rebuild(events, index, options)?.hash,
        second: rebuild(events, index, options)?.hash,
    })
}
