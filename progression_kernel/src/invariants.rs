/// Progression Kernel — Configuration Checks
///
/// Every check returns the first violation found as a
/// `ConfigurationError`. Tables are validated as a whole; there is no
/// partial patching of a rule table or ladder.

use std::collections::BTreeSet;

use crate::domain::{LevelThreshold, XpRule};
use crate::error::ConfigurationError;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Ladder must be non-empty, start at (level 1, 0 XP), and be strictly
/// increasing in both level and XP.
pub fn validate_ladder(ladder: &[LevelThreshold]) -> Result<(), ConfigurationError> {
    check_ladder_non_empty(ladder)?;
    check_ladder_origin(ladder)?;
    check_ladder_ascending(ladder)?;
    Ok(())
}

/// Rule ids must be non-empty and unique within one table.
pub fn validate_rules(rules: &[XpRule]) -> Result<(), ConfigurationError> {
    check_rule_ids_present(rules)?;
    check_rule_ids_unique(rules)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

fn check_ladder_non_empty(ladder: &[LevelThreshold]) -> Result<(), ConfigurationError> {
    if ladder.is_empty() {
        return Err(ConfigurationError::EmptyLadder);
    }
    Ok(())
}

fn check_ladder_origin(ladder: &[LevelThreshold]) -> Result<(), ConfigurationError> {
    let first = ladder[0];
    if first.level != 1 || first.xp_required != 0 {
        return Err(ConfigurationError::LadderMustStartAtZero {
            level: first.level,
            xp_required: first.xp_required,
        });
    }
    Ok(())
}

fn check_ladder_ascending(ladder: &[LevelThreshold]) -> Result<(), ConfigurationError> {
    for (index, pair) in ladder.windows(2).enumerate() {
        if pair[1].level <= pair[0].level || pair[1].xp_required <= pair[0].xp_required {
            return Err(ConfigurationError::LadderNotAscending { index: index + 1 });
        }
    }
    Ok(())
}

fn check_rule_ids_present(rules: &[XpRule]) -> Result<(), ConfigurationError> {
    match rules.iter().position(|r| r.id.is_empty()) {
        Some(index) => Err(ConfigurationError::EmptyRuleId { index }),
        None => Ok(()),
    }
}

fn check_rule_ids_unique(rules: &[XpRule]) -> Result<(), ConfigurationError> {
    let mut seen = BTreeSet::new();
    for rule in rules {
        if !seen.insert(rule.id.as_str()) {
            return Err(ConfigurationError::DuplicateRuleId(rule.id.clone()));
        }
    }
    Ok(())
}
