/// Progression Kernel — Arithmetic Primitives
///
/// All XP values: i64. Integer math only, no float.
/// Sums saturate instead of overflowing so a reduction is always total.

/// XP added to the top rung when the ladder has no further entry.
pub const SOFT_CAP_STEP: i64 = 1000;

/// Saturating XP addition.
pub fn add_xp(a: i64, b: i64) -> i64 {
    a.saturating_add(b)
}

/// Integer percentage of the way from `current` to `next`, floored and
/// bounded to `0..=100`. A zero-width span yields 0.
pub fn progress_percent(total: i64, current: i64, next: i64) -> u32 {
    let span = i128::from(next) - i128::from(current);
    if span <= 0 {
        return 0;
    }
    let into = (i128::from(total) - i128::from(current)).max(0);
    let pct = (into * 100) / span;
    pct.min(100) as u32
}
