//! ============================================================================
//! Reward Engine - Activity outcome to currency / experience delta
//! ============================================================================
//! Pure computation with no side effects. Callers apply the result through
//! the ledger (`Engine::record_activity` does both atomically).
//!
//! coins = floor(floor(score / 10) * multiplier)
//! xp    = floor(floor(score / 5)  * multiplier)
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{EngineError, Result};

/// Score points per coin before the difficulty multiplier
pub const SCORE_PER_COIN: u64 = 10;

/// Score points per experience point before the difficulty multiplier
pub const SCORE_PER_XP: u64 = 5;

/// Kinds of activity that earn rewards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Memory-match game
    Memory,
    /// Reaction-time game
    Reaction,
    /// Puzzle game
    Puzzle,
    /// Trivia quiz
    Trivia,
    /// Completed study session
    Study,
    /// Logged expense entry
    Expense,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::Memory,
        ActivityKind::Reaction,
        ActivityKind::Puzzle,
        ActivityKind::Trivia,
        ActivityKind::Study,
        ActivityKind::Expense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Memory => "memory",
            ActivityKind::Reaction => "reaction",
            ActivityKind::Puzzle => "puzzle",
            ActivityKind::Trivia => "trivia",
            ActivityKind::Study => "study",
            ActivityKind::Expense => "expense",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(ActivityKind::Memory),
            "reaction" => Ok(ActivityKind::Reaction),
            "puzzle" => Ok(ActivityKind::Puzzle),
            "trivia" => Ok(ActivityKind::Trivia),
            "study" => Ok(ActivityKind::Study),
            "expense" => Ok(ActivityKind::Expense),
            _ => Err(EngineError::InvalidActivity(s.to_string())),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty tier with a fixed reward multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// Multiplier as an exact ratio (numerator, denominator)
    pub fn multiplier(&self) -> (u64, u64) {
        match self {
            Difficulty::Easy => (2, 2),
            Difficulty::Medium => (3, 2),
            Difficulty::Hard => (4, 2),
            Difficulty::Expert => (6, 2),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        }
    }

    /// floor(base * multiplier); `None` if the product leaves u64
    fn scale(&self, base: u64) -> Option<u64> {
        let (num, den) = self.multiplier();
        base.checked_mul(num).map(|scaled| scaled / den)
    }
}

impl FromStr for Difficulty {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "expert" => Ok(Difficulty::Expert),
            _ => Err(EngineError::InvalidDifficulty(s.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Currency and experience earned by one activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reward {
    pub coins: u64,
    pub xp: u64,
}

/// Compute the reward for an activity outcome. Every kind uses the same
/// scale; `kind` is validated by the type and recorded by the caller.
pub fn compute_reward(kind: ActivityKind, raw_score: u64, difficulty: Difficulty) -> Result<Reward> {
    let overflow = || {
        EngineError::InvalidInput(format!(
            "{} reward for score {} at {} overflows",
            kind, raw_score, difficulty
        ))
    };
    Ok(Reward {
        coins: difficulty.scale(raw_score / SCORE_PER_COIN).ok_or_else(overflow)?,
        xp: difficulty.scale(raw_score / SCORE_PER_XP).ok_or_else(overflow)?,
    })
}

/// Parse names as supplied by an activity source, then compute
pub fn compute_reward_by_name(kind: &str, raw_score: u64, difficulty: &str) -> Result<Reward> {
    let kind: ActivityKind = kind.parse()?;
    let difficulty: Difficulty = difficulty.parse()?;
    compute_reward(kind, raw_score, difficulty)
}

/// An activity outcome delivered by an external activity source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Source-assigned id; a reward is applied at most once per id
    pub activity_id: String,
    pub kind: ActivityKind,
    pub raw_score: u64,
    pub difficulty: Difficulty,
}

impl ActivityEvent {
    pub fn new(
        activity_id: impl Into<String>,
        kind: ActivityKind,
        raw_score: u64,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            activity_id: activity_id.into(),
            kind,
            raw_score,
            difficulty,
        }
    }

    pub fn reward(&self) -> Result<Reward> {
        compute_reward(self.kind, self.raw_score, self.difficulty)
    }
}
