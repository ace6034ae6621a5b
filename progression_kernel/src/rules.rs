/// Progression Kernel — Default Rule Table
///
/// The table seeded as rule-set version 1. Replaced wholesale by
/// later rule-set versions, never patched.

use crate::domain::XpRule;

/// Default scoring rules for a fresh store.
pub fn default_rules() -> Vec<XpRule> {
    vec![
        XpRule::new("HOH_WIN", "Head of Household", 100, "Won the Head of Household competition")
            .per_week(1),
        XpRule::new("POV_WIN", "Power of Veto", 75, "Won the Power of Veto competition")
            .per_week(1),
        XpRule::new("COMP_WIN", "Competition Win", 100, "Won any other competition")
            .per_week(2),
        XpRule::new("MINIGAME_WIN", "Minigame Win", 10, "Won a house minigame").per_week(5),
        XpRule::new("SURVIVED_BLOCK", "Survived the Block", 40, "Survived an eviction vote while nominated")
            .per_week(1),
        XpRule::new("SAVED_BY_VETO", "Saved by Veto", 30, "Removed from the block by the veto")
            .per_week(1),
        XpRule::new("NOMINATED", "Nominated", -25, "Placed on the block for eviction")
            .per_week(2),
        XpRule::new("ALLIANCE_FORMED", "Alliance Formed", 20, "Formed a new alliance").per_season(3),
        XpRule::new("BETRAYED", "Betrayal", -40, "Broke an alliance").per_season(3),
        XpRule::new("EVICTED", "Evicted", -50, "Evicted from the house").per_season(1),
        XpRule::new("JURY", "Jury Member", 150, "Reached the jury phase").per_season(1),
        XpRule::new("FINALIST", "Finalist", 250, "Reached the final two").per_season(1),
        XpRule::new("SEASON_WIN", "Season Winner", 500, "Won the season").per_season(1),
        XpRule::new("FAN_FAVORITE", "Fan Favorite", 200, "Voted fan favorite").per_season(1),
        XpRule::new("DAILY_LOGIN", "Daily Check-in", 5, "Played on a new day"),
    ]
}

/// `base_xp` for `rule_id` in the default table, or 0 when unknown.
pub fn default_reward(rule_id: &str) -> i64 {
    reward_in(&default_rules(), rule_id)
}

/// `base_xp` for `rule_id` in an arbitrary table, or 0 when unknown.
pub fn reward_in(rules: &[XpRule], rule_id: &str) -> i64 {
    rules
        .iter()
        .find(|r| r.id == rule_id)
        .map(|r| r.base_xp)
        .unwrap_or(0)
}
