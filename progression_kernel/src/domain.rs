/// Progression Kernel — Core Domain Types
///
/// Pure data. No behaviour beyond lookups.
/// All XP values are signed i64; negative amounts are penalties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Rules ──────────────────────────────────────────────────────────

/// A named reason for an XP change, with optional frequency caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpRule {
    pub id: String,
    pub name: String,
    pub base_xp: i64,
    #[serde(default)]
    pub description: String,
    /// Max awarding events per (rule, week). Only enforced on events carrying a week.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_week: Option<u32>,
    /// Max awarding events per (rule, season). Only enforced on events carrying a season.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_season: Option<u32>,
}

impl XpRule {
    pub fn new(id: &str, name: &str, base_xp: i64, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            base_xp,
            description: description.to_string(),
            per_week: None,
            per_season: None,
        }
    }

    pub fn per_week(mut self, limit: u32) -> Self {
        self.per_week = Some(limit);
        self
    }

    pub fn per_season(mut self, limit: u32) -> Self {
        self.per_season = Some(limit);
        self
    }
}

/// Immutable, versioned bundle of rules. The highest version is current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpRuleSet {
    pub id: String,
    pub version: u32,
    pub rules: Vec<XpRule>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl XpRuleSet {
    pub fn rule(&self, rule_id: &str) -> Option<&XpRule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }

    /// `base_xp` of the rule, or 0 when the rule is unknown.
    /// Convenience for callers choosing an amount; the reducer never uses it.
    pub fn reward_for(&self, rule_id: &str) -> i64 {
        self.rule(rule_id).map(|r| r.base_xp).unwrap_or(0)
    }
}

// ── Levels ─────────────────────────────────────────────────────────

/// One rung of the XP → level ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThreshold {
    pub level: u32,
    pub xp_required: i64,
}

impl LevelThreshold {
    pub const fn new(level: u32, xp_required: i64) -> Self {
        Self { level, xp_required }
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Atomic unit of history. Immutable once stored.
///
/// `amount` is authoritative: it is never re-derived from the rule's
/// `base_xp` at reduce time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpEvent {
    pub id: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub rule_id: String,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    /// Rule-set version that was current when the event was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_set_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// Caller-supplied context for a new event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    /// Free-form details kept alongside the event (not used for scoring).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl EventMeta {
    pub fn week(week: u32) -> Self {
        Self {
            week: Some(week),
            ..Self::default()
        }
    }

    pub fn with_season(mut self, season: u32) -> Self {
        self.season = Some(season);
        self
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

impl XpEvent {
    /// Assemble an event from its parts. Id and timestamp are supplied by
    /// the caller so the kernel stays free of clocks and randomness.
    pub fn new(
        id: String,
        timestamp: i64,
        rule_id: &str,
        amount: i64,
        meta: Option<EventMeta>,
    ) -> Self {
        let meta = meta.unwrap_or_default();
        Self {
            id,
            timestamp,
            rule_id: rule_id.to_string(),
            amount,
            week: meta.week,
            season: meta.season,
            rule_set_version: None,
            meta: if meta.details.is_empty() {
                None
            } else {
                Some(meta.details)
            },
        }
    }

    pub fn stamped_with(mut self, rule_set_version: u32) -> Self {
        self.rule_set_version = Some(rule_set_version);
        self
    }
}

// ── Derived state ──────────────────────────────────────────────────

/// Derived, non-authoritative view. Always recomputable from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub total_xp: i64,
    pub level: u32,
    pub current_level_xp: i64,
    pub next_level_xp: i64,
    pub progress_percent: u32,
    pub events_count: u64,
}

/// Applied-event aggregate for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBreakdown {
    pub count: u64,
    pub total_xp: i64,
    pub rule_name: String,
}

/// Per-rule aggregate keyed by rule id. Only rules with at least one
/// applied event appear.
pub type Breakdown = BTreeMap<String, RuleBreakdown>;
