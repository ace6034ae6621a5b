#![forbid(unsafe_code)]

//! Progression Kernel — deterministic XP and level derivation.
//!
//! Pure functions over an ordered event log. No I/O, no clocks, no
//! randomness: identical inputs always yield identical state.

/// Reducer v1. Part of every canonical state hash.
pub const REDUCER_VERSION: u32 = 1;

pub mod arithmetic;
pub mod domain;
pub mod error;
pub mod rules;
pub mod levels;
pub mod invariants;
pub mod accumulator;
pub mod reducer;
pub mod hashing;

pub use accumulator::{Accumulator, FoldStats, Outcome};
pub use domain::{
    Breakdown, EventMeta, LevelThreshold, PlayerState, RuleBreakdown, XpEvent, XpRule, XpRuleSet,
};
pub use error::ConfigurationError;
pub use reducer::{ReduceOptions, RuleIndex, RuleScope};
