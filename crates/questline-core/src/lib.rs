//! ============================================================================
//! QUESTLINE-CORE: Progression & Virtual-Economy Engine
//! ============================================================================
//! Authoritative ledger behind the Questline activities:
//! - Per-account currency, experience and level with automatic rollover
//! - Deterministic rewards from activity scores and difficulty
//! - Crafting, store purchases and inventories
//! - Item-for-coins trade offers, friendships and clans
//! All mutations are lock-scoped and commit as one redb transaction.
//! ============================================================================

pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod locks;
pub mod progression;
pub mod retry;
pub mod reward;
pub mod types;

// Re-export main types for convenience
pub use catalog::{Catalog, ItemRarity, ItemTemplate, Listing, Recipe};
pub use config::EngineConfig;
pub use db::GameDb;
pub use engine::Engine;
pub use retry::RetryConfig;
pub use reward::{compute_reward, compute_reward_by_name, ActivityEvent, ActivityKind, Difficulty, Reward};
pub use types::*;
