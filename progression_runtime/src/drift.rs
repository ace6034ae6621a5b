//! Drift detection — how derived standing moves between two replays.
//!
//! Used to preview what a rule-set update would retroactively change
//! before committing it. All values are integers.

use std::collections::BTreeSet;

use progression_kernel::{Breakdown, PlayerState};

/// Per-rule change between two breakdowns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDrift {
    pub rule_id: String,
    pub count_before: u64,
    pub count_after: u64,
    pub xp_before: i64,
    pub xp_after: i64,
}

impl RuleDrift {
    pub fn xp_delta(&self) -> i64 {
        self.xp_after - self.xp_before
    }
}

/// Structured drift report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    pub total_xp_before: i64,
    pub total_xp_after: i64,
    pub total_xp_delta: i64,
    pub level_before: u32,
    pub level_after: u32,
    pub level_delta: i64,
    /// Rules whose applied count or XP differs. Sorted by rule id.
    pub changed_rules: Vec<RuleDrift>,
}

impl DriftReport {
    pub fn is_unchanged(&self) -> bool {
        self.total_xp_delta == 0 && self.level_delta == 0 && self.changed_rules.is_empty()
    }
}

pub fn compare_states(
    before: &PlayerState,
    before_breakdown: &Breakdown,
    after: &PlayerState,
    after_breakdown: &Breakdown,
) -> DriftReport {
    let ids: BTreeSet<&str> = before_breakdown
        .keys()
        .chain(after_breakdown.keys())
        .map(|s| s.as_str())
        .collect();

    let mut changed_rules = Vec::new();
    for rule_id in ids {
        let (count_before, xp_before) = before_breakdown
            .get(rule_id)
            .map(|b| (b.count, b.total_xp))
            .unwrap_or((0, 0));
        let (count_after, xp_after) = after_breakdown
            .get(rule_id)
            .map(|b| (b.count, b.total_xp))
            .unwrap_or((0, 0));
        if count_before != count_after || xp_before != xp_after {
            changed_rules.push(RuleDrift {
                rule_id: rule_id.to_string(),
                count_before,
                count_after,
                xp_before,
                xp_after,
            });
        }
    }

    DriftReport {
        total_xp_before: before.total_xp,
        total_xp_after: after.total_xp,
        total_xp_delta: after.total_xp - before.total_xp,
        level_before: before.level,
        level_after: after.level,
        level_delta: i64::from(after.level) - i64::from(before.level),
        changed_rules,
    }
}
