/// Progression Kernel — Configuration Errors
///
/// The only failure the kernel can report. Silent-skip outcomes
/// (unknown rule, capped event) are not errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("level threshold ladder is empty")]
    EmptyLadder,

    #[error("level threshold ladder must start at level 1 with 0 XP, got level {level} at {xp_required} XP")]
    LadderMustStartAtZero { level: u32, xp_required: i64 },

    #[error("level threshold ladder is not strictly ascending at index {index}")]
    LadderNotAscending { index: usize },

    #[error("rule id must not be empty (rule index {index})")]
    EmptyRuleId { index: usize },

    #[error("duplicate rule id {0:?}")]
    DuplicateRuleId(String),
}
