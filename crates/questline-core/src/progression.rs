//! ============================================================================
//! Progression - Experience thresholds and level rollover
//! ============================================================================
//! Pure arithmetic for the ledger. The threshold for leaving level `n` is
//! `n * 1000` experience; a single reward may cross several thresholds.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Experience required per level, multiplied by the current level
pub const XP_PER_LEVEL: u64 = 1000;

/// Level every account starts at
pub const STARTING_LEVEL: u32 = 1;

/// Experience needed to advance out of `level`
pub fn xp_threshold(level: u32) -> u64 {
    u64::from(level.max(STARTING_LEVEL)) * XP_PER_LEVEL
}

/// Result of rolling accumulated experience into levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollover {
    pub level: u32,
    pub experience: u64,
    pub levels_gained: u32,
}

/// Add `xp_delta` to the current state and advance levels while the
/// accumulated experience meets the current threshold.
///
/// Thresholds grow with each level, so the loop runs at most
/// O(sqrt(experience)) times. `None` if the sum does not fit in u64.
pub fn roll_over(level: u32, experience: u64, xp_delta: u64) -> Option<Rollover> {
    let mut level = level.max(STARTING_LEVEL);
    let mut experience = experience.checked_add(xp_delta)?;
    let mut levels_gained = 0;

    while level < u32::MAX && experience >= xp_threshold(level) {
        experience -= xp_threshold(level);
        level += 1;
        levels_gained += 1;
    }

    Some(Rollover {
        level,
        experience,
        levels_gained,
    })
}

/// Progress toward the next level, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub experience: u64,
    pub threshold: u64,
    pub remaining: u64,
}

pub fn progress_to_next_level(level: u32, experience: u64) -> LevelProgress {
    let threshold = xp_threshold(level);
    LevelProgress {
        level,
        experience,
        threshold,
        remaining: threshold.saturating_sub(experience),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_scales_with_level() {
        assert_eq!(xp_threshold(1), 1000);
        assert_eq!(xp_threshold(2), 2000);
        assert_eq!(xp_threshold(10), 10_000);
    }

    #[test]
    fn test_no_rollover_below_threshold() {
        let r = roll_over(1, 200, 799).unwrap();
        assert_eq!(r, Rollover { level: 1, experience: 999, levels_gained: 0 });
    }

    #[test]
    fn test_exact_threshold_advances_one_level() {
        let r = roll_over(1, 0, 1000).unwrap();
        assert_eq!(r, Rollover { level: 2, experience: 0, levels_gained: 1 });
    }

    #[test]
    fn test_multi_level_rollover() {
        // 1000 (L1) + 2000 (L2) + 3000 (L3) = 6000, remainder 500 at L4
        let r = roll_over(1, 0, 6500).unwrap();
        assert_eq!(r, Rollover { level: 4, experience: 500, levels_gained: 3 });
    }

    #[test]
    fn test_rollover_invariant_holds_for_many_inputs() {
        let mut level = 1;
        let mut experience = 0;
        for delta in [0u64, 1, 999, 1000, 1001, 2500, 12_345, 250_000, 7] {
            let before = level;
            let r = roll_over(level, experience, delta).unwrap();
            assert!(r.experience < xp_threshold(r.level));
            assert!(r.level >= before);
            assert_eq!(r.level - before, r.levels_gained);
            level = r.level;
            experience = r.experience;
        }
    }

    #[test]
    fn test_experience_overflow_is_reported() {
        assert_eq!(roll_over(1, u64::MAX, 1), None);
        assert_eq!(roll_over(7, u64::MAX - 10, 11), None);
        assert!(roll_over(1, u64::MAX - 10, 10).is_some());
    }

    #[test]
    fn test_progress_to_next_level() {
        let p = progress_to_next_level(3, 1200);
        assert_eq!(p.threshold, 3000);
        assert_eq!(p.remaining, 1800);
    }
}
