/// Progression Kernel — Accumulator
///
/// Running totals and cap counters, fed one event at a time.
/// The reducer is a fold of this type over the log, so an accumulator
/// kept alive across writes observes exactly what a full replay does.
///
/// Cap counters are keyed by (rule id, week) and (rule id, season).
/// They live only as long as the accumulator; nothing is persisted.

use std::collections::BTreeMap;

use crate::arithmetic::add_xp;
use crate::domain::{Breakdown, PlayerState, RuleBreakdown, XpEvent, XpRule};
use crate::error::ConfigurationError;
use crate::levels::player_state;
use crate::reducer::ReduceOptions;

/// What happened to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Rule id absent from the active rule set; counters untouched.
    UnknownRule,
    /// Weekly cap for (rule, week) already reached.
    CappedWeekly,
    /// Seasonal cap for (rule, season) already reached.
    CappedSeasonal,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// Skip counts gathered during a fold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldStats {
    pub applied: u64,
    pub unknown_rule: u64,
    pub capped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    raw_total: i64,
    events_count: u64,
    weekly: BTreeMap<(String, u32), u32>,
    seasonal: BTreeMap<(String, u32), u32>,
    breakdown: Breakdown,
    stats: FoldStats,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event. `rule` is the resolved rule for the event, or
    /// `None` when the event's rule id is unknown.
    ///
    /// The weekly gate runs before the seasonal gate. An event accepted
    /// by the weekly gate but rejected by the seasonal one still
    /// consumes its weekly slot.
    pub fn apply(&mut self, event: &XpEvent, rule: Option<&XpRule>) -> Outcome {
        self.events_count += 1;

        let Some(rule) = rule else {
            self.stats.unknown_rule += 1;
            return Outcome::UnknownRule;
        };

        if let (Some(limit), Some(week)) = (rule.per_week, event.week) {
            if !take_slot(&mut self.weekly, &rule.id, week, limit) {
                self.stats.capped += 1;
                return Outcome::CappedWeekly;
            }
        }

        if let (Some(limit), Some(season)) = (rule.per_season, event.season) {
            if !take_slot(&mut self.seasonal, &rule.id, season, limit) {
                self.stats.capped += 1;
                return Outcome::CappedSeasonal;
            }
        }

        self.raw_total = add_xp(self.raw_total, event.amount);

        let entry = self
            .breakdown
            .entry(rule.id.clone())
            .or_insert_with(|| RuleBreakdown {
                count: 0,
                total_xp: 0,
                rule_name: rule.name.clone(),
            });
        entry.count += 1;
        entry.total_xp = add_xp(entry.total_xp, event.amount);
        entry.rule_name = rule.name.clone();

        self.stats.applied += 1;
        Outcome::Applied
    }

    /// Unclamped sum of applied amounts.
    pub fn raw_total(&self) -> i64 {
        self.raw_total
    }

    /// Every event fed, including skipped and capped ones.
    pub fn events_count(&self) -> u64 {
        self.events_count
    }

    pub fn stats(&self) -> FoldStats {
        self.stats
    }

    pub fn breakdown(&self) -> &Breakdown {
        &self.breakdown
    }

    pub fn into_breakdown(self) -> Breakdown {
        self.breakdown
    }

    /// Derive the player state: clamp once, then place on the ladder.
    pub fn state(&self, options: &ReduceOptions) -> Result<PlayerState, ConfigurationError> {
        let total = self.raw_total.max(options.clamp_min_xp);
        player_state(total, self.events_count, &options.level_thresholds)
    }
}

/// Consume one cap slot. Returns false (leaving the counter as is) when
/// the limit is already reached.
fn take_slot(
    counters: &mut BTreeMap<(String, u32), u32>,
    rule_id: &str,
    period: u32,
    limit: u32,
) -> bool {
    let count = counters.entry((rule_id.to_string(), period)).or_insert(0);
    if *count >= limit {
        return false;
    }
    *count += 1;
    true
}
