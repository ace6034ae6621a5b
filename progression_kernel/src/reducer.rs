/// Progression Kernel — Reducer
///
/// Pure, deterministic derivation of `PlayerState` and `Breakdown`
/// from an ordered event log. Both outputs come from the same fold,
/// so they always agree on which events counted.
///
/// Events are taken in the order supplied (storage insertion order),
/// never re-sorted by timestamp.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::accumulator::Accumulator;
use crate::domain::{Breakdown, LevelThreshold, PlayerState, XpEvent, XpRule, XpRuleSet};
use crate::error::ConfigurationError;
use crate::invariants::validate_ladder;
use crate::levels::default_thresholds;

/// Options applied after the fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceOptions {
    /// Floor for the cumulative total. Applied once, never per event.
    pub clamp_min_xp: i64,
    pub level_thresholds: Vec<LevelThreshold>,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            clamp_min_xp: 0,
            level_thresholds: default_thresholds(),
        }
    }
}

/// Which rule-set version scores an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// The current rule set scores the whole history.
    #[default]
    Retroactive,
    /// Each event is scored by the version stamped on it when recorded.
    PerVersion,
}

// ---------------------------------------------------------------------------
// Rule lookup
// ---------------------------------------------------------------------------

/// Rule lookup by id, optionally per rule-set version.
#[derive(Debug, Clone)]
pub struct RuleIndex<'a> {
    tables: BTreeMap<u32, BTreeMap<&'a str, &'a XpRule>>,
    current: Option<u32>,
    scope: RuleScope,
}

impl<'a> RuleIndex<'a> {
    /// Score every event with `rule_set`.
    pub fn retroactive(rule_set: &'a XpRuleSet) -> Self {
        Self::build(std::slice::from_ref(rule_set), RuleScope::Retroactive)
    }

    /// Score each event with the rule-set version stamped on it. Events
    /// with no stamp, or a stamp not present in `rule_sets`, fall back
    /// to the highest version.
    pub fn per_version(rule_sets: &'a [XpRuleSet]) -> Self {
        Self::build(rule_sets, RuleScope::PerVersion)
    }

    pub fn for_scope(rule_sets: &'a [XpRuleSet], scope: RuleScope) -> Self {
        match scope {
            RuleScope::Retroactive => match rule_sets.iter().max_by_key(|rs| rs.version) {
                Some(current) => Self::retroactive(current),
                None => Self::build(&[], RuleScope::Retroactive),
            },
            RuleScope::PerVersion => Self::per_version(rule_sets),
        }
    }

    fn build(rule_sets: &'a [XpRuleSet], scope: RuleScope) -> Self {
        let mut tables = BTreeMap::new();
        for rs in rule_sets {
            let table: &mut BTreeMap<&'a str, &'a XpRule> = tables.entry(rs.version).or_default();
            for rule in &rs.rules {
                // First definition of an id wins, matching XpRuleSet::rule.
                table.entry(rule.id.as_str()).or_insert(rule);
            }
        }
        let current = tables.keys().next_back().copied();
        Self {
            tables,
            current,
            scope,
        }
    }

    pub fn scope(&self) -> RuleScope {
        self.scope
    }

    /// Rule that scores `event`, or `None` when its rule id is unknown.
    pub fn resolve(&self, event: &XpEvent) -> Option<&'a XpRule> {
        let version = match self.scope {
            RuleScope::Retroactive => self.current,
            RuleScope::PerVersion => event
                .rule_set_version
                .filter(|v| self.tables.contains_key(v))
                .or(self.current),
        }?;
        self.tables.get(&version)?.get(event.rule_id.as_str()).copied()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Fold `events` into an accumulator.
pub fn accumulate(events: &[XpEvent], index: &RuleIndex<'_>) -> Accumulator {
    let mut acc = Accumulator::new();
    for event in events {
        acc.apply(event, index.resolve(event));
    }
    acc
}

/// Reduce the log under the current rule set (retroactive scoring).
pub fn reduce(
    events: &[XpEvent],
    rule_set: &XpRuleSet,
    options: &ReduceOptions,
) -> Result<PlayerState, ConfigurationError> {
    reduce_with(events, &RuleIndex::retroactive(rule_set), options)
}

/// Reduce the log with an explicit rule index.
///
/// Fails only when the ladder is invalid, and fails before folding.
pub fn reduce_with(
    events: &[XpEvent],
    index: &RuleIndex<'_>,
    options: &ReduceOptions,
) -> Result<PlayerState, ConfigurationError> {
    validate_ladder(&options.level_thresholds)?;
    accumulate(events, index).state(options)
}

/// Per-rule applied counts and XP under the current rule set.
pub fn breakdown(events: &[XpEvent], rule_set: &XpRuleSet) -> Breakdown {
    breakdown_with(events, &RuleIndex::retroactive(rule_set))
}

pub fn breakdown_with(events: &[XpEvent], index: &RuleIndex<'_>) -> Breakdown {
    accumulate(events, index).into_breakdown()
}
