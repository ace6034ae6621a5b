/// Progression Kernel — Level Ladder
///
/// Maps cumulative XP to a level. The ladder is validated before use;
/// an empty ladder is the one configuration error the reducer reports.

use crate::arithmetic::{add_xp, progress_percent, SOFT_CAP_STEP};
use crate::domain::{LevelThreshold, PlayerState};
use crate::error::ConfigurationError;
use crate::invariants::validate_ladder;

/// Default XP → level ladder.
pub fn default_thresholds() -> Vec<LevelThreshold> {
    vec![
        LevelThreshold::new(1, 0),
        LevelThreshold::new(2, 100),
        LevelThreshold::new(3, 250),
        LevelThreshold::new(4, 500),
        LevelThreshold::new(5, 850),
        LevelThreshold::new(6, 1300),
        LevelThreshold::new(7, 1900),
        LevelThreshold::new(8, 2600),
        LevelThreshold::new(9, 3500),
        LevelThreshold::new(10, 5000),
    ]
}

/// Level placement of a total on the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelPosition {
    pub level: u32,
    pub current_level_xp: i64,
    pub next_level_xp: i64,
    pub progress_percent: u32,
}

/// Highest rung whose requirement does not exceed `total_xp`.
///
/// Past the top rung the next requirement is `current + SOFT_CAP_STEP`.
/// Totals below the first rung sit on the first rung.
pub fn position_for(
    total_xp: i64,
    ladder: &[LevelThreshold],
) -> Result<LevelPosition, ConfigurationError> {
    validate_ladder(ladder)?;

    let idx = ladder
        .iter()
        .rposition(|t| t.xp_required <= total_xp)
        .unwrap_or(0);
    let current = ladder[idx];

    let (next_level_xp, at_top) = match ladder.get(idx + 1) {
        Some(next) => (next.xp_required, false),
        None => (add_xp(current.xp_required, SOFT_CAP_STEP), true),
    };

    let progress = if at_top && current.xp_required == 0 {
        0
    } else {
        progress_percent(total_xp, current.xp_required, next_level_xp)
    };

    Ok(LevelPosition {
        level: current.level,
        current_level_xp: current.xp_required,
        next_level_xp,
        progress_percent: progress,
    })
}

/// Build the derived state for a clamped total.
pub fn player_state(
    total_xp: i64,
    events_count: u64,
    ladder: &[LevelThreshold],
) -> Result<PlayerState, ConfigurationError> {
    let pos = position_for(total_xp, ladder)?;
    Ok(PlayerState {
        total_xp,
        level: pos.level,
        current_level_xp: pos.current_level_xp,
        next_level_xp: pos.next_level_xp,
        progress_percent: pos.progress_percent,
        events_count,
    })
}
