//! ============================================================================
//! Database Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::catalog::{ItemRarity, ItemTemplate};
use crate::progression::{self, LevelProgress, STARTING_LEVEL};
use crate::reward::{ActivityKind, Difficulty, Reward};
use crate::types::{EngineError, LedgerSnapshot, Result};

// ============================================================================
// Ledger
// ============================================================================

/// Per-user ledger record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub coins: u64,
    /// Experience toward the next level; always below the level threshold
    pub experience: u64,
    pub level: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    pub fn new(user_id: &str, coins: u64, now: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            coins,
            experience: 0,
            level: STARTING_LEVEL,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn snapshot(&self, levels_gained: u32) -> LedgerSnapshot {
        LedgerSnapshot {
            coins: self.coins,
            experience: self.experience,
            level: self.level,
            levels_gained,
        }
    }

    pub fn progress(&self) -> LevelProgress {
        progression::progress_to_next_level(self.level, self.experience)
    }
}

/// Log entry making reward application exactly-once per activity id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub activity_id: String,
    pub user_id: String,
    pub kind: ActivityKind,
    pub raw_score: u64,
    pub difficulty: Difficulty,
    pub reward: Reward,
    pub recorded_at: i64,
}

/// Result of recording an activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityOutcome {
    pub activity_id: String,
    pub reward: Reward,
    pub snapshot: LedgerSnapshot,
    /// The activity id was already recorded; nothing was applied
    pub duplicate: bool,
}

// ============================================================================
// Inventory
// ============================================================================

/// How an item instance entered its owner's inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    Crafted,
    Purchased,
    Traded,
    Granted,
}

/// Resource merged by name into a single counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackableResource {
    pub name: String,
    pub item_type: String,
    pub quantity: u64,
    pub updated_at: i64,
}

/// Individually tracked item, never merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: String,
    pub name: String,
    pub item_type: String,
    pub rarity: ItemRarity,
    pub power: Option<u32>,
    pub duration_secs: Option<u64>,
    pub uses: Option<u32>,
    pub source: ItemSource,
    pub created_at: i64,
    pub acquired_at: i64,
}

impl ItemInstance {
    /// Fresh instance with a generated id
    pub fn from_template(template: &ItemTemplate, source: ItemSource, now: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: template.name.clone(),
            item_type: template.item_type.clone(),
            rarity: template.rarity,
            power: template.power,
            duration_secs: template.duration_secs,
            uses: template.uses,
            source,
            created_at: now,
            acquired_at: now,
        }
    }
}

/// A user's inventory container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub owner: String,
    /// Stackable resources keyed by name
    pub stacks: BTreeMap<String, StackableResource>,
    pub instances: Vec<ItemInstance>,
}

impl Inventory {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            stacks: BTreeMap::new(),
            instances: Vec::new(),
        }
    }

    pub fn find_instance(&self, item_id: &str) -> Option<&ItemInstance> {
        self.instances.iter().find(|i| i.id == item_id)
    }

    /// Remove and return an instance
    pub fn take_instance(&mut self, item_id: &str) -> Option<ItemInstance> {
        let pos = self.instances.iter().position(|i| i.id == item_id)?;
        Some(self.instances.remove(pos))
    }

    /// Merge `quantity` into the stack named `name`, creating it if needed
    pub fn add_stack(
        &mut self,
        name: &str,
        item_type: &str,
        quantity: u64,
        now: i64,
    ) -> Result<StackableResource> {
        if quantity == 0 {
            return Err(EngineError::InvalidQuantity(quantity));
        }

        let stack = self
            .stacks
            .entry(name.to_string())
            .or_insert_with(|| StackableResource {
                name: name.to_string(),
                item_type: item_type.to_string(),
                quantity: 0,
                updated_at: now,
            });
        stack.quantity = stack.quantity.checked_add(quantity).ok_or_else(|| {
            EngineError::InvalidInput(format!("quantity of {} would overflow", name))
        })?;
        stack.updated_at = now;
        Ok(stack.clone())
    }

    /// Remove `quantity` from a stack, dropping the stack when it reaches zero.
    /// Returns the remaining quantity.
    pub fn consume_stack(&mut self, name: &str, quantity: u64, now: i64) -> Result<u64> {
        if quantity == 0 {
            return Err(EngineError::InvalidQuantity(quantity));
        }

        let stack = self
            .stacks
            .get_mut(name)
            .ok_or_else(|| EngineError::ItemNotFound(name.to_string()))?;
        if stack.quantity < quantity {
            return Err(EngineError::InsufficientQuantity {
                name: name.to_string(),
                needed: quantity,
                available: stack.quantity,
            });
        }

        stack.quantity -= quantity;
        stack.updated_at = now;
        let remaining = stack.quantity;
        if remaining == 0 {
            self.stacks.remove(name);
        }
        Ok(remaining)
    }
}

/// Item obtained by crafting or purchase, with the balance after payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    pub item: ItemInstance,
    pub coins: u64,
}

// ============================================================================
// Trade
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OfferStatus::Pending)
    }
}

/// Decision applied to a pending offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDecision {
    /// Target takes the item and pays the requested coins
    Accept,
    /// Target declines
    Reject,
    /// Proposer withdraws
    Cancel,
}

impl TradeDecision {
    pub fn resulting_status(&self) -> OfferStatus {
        match self {
            TradeDecision::Accept => OfferStatus::Accepted,
            TradeDecision::Reject => OfferStatus::Rejected,
            TradeDecision::Cancel => OfferStatus::Cancelled,
        }
    }
}

impl FromStr for TradeDecision {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "accept" => Ok(TradeDecision::Accept),
            "reject" => Ok(TradeDecision::Reject),
            "cancel" => Ok(TradeDecision::Cancel),
            _ => Err(EngineError::InvalidInput(format!(
                "unknown trade decision '{}'",
                s
            ))),
        }
    }
}

/// Offer of one item instance in exchange for coins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub id: String,
    pub proposer_id: String,
    pub target_id: String,
    pub item_id: String,
    /// Item name at offer time, for display
    pub item_name: String,
    pub item_type: String,
    pub requested_coins: u64,
    pub status: OfferStatus,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

// ============================================================================
// Social graph
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendStatus::Pending => "pending",
            FriendStatus::Accepted => "accepted",
            FriendStatus::Rejected => "rejected",
            FriendStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for FriendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship between an unordered pair of users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friendship {
    /// Lexicographically smaller id of the pair
    pub user_low: String,
    pub user_high: String,
    pub requester_id: String,
    pub status: FriendStatus,
    pub blocked_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Friendship {
    /// Canonical key for an unordered pair. The smaller id is length-prefixed,
    /// so the split point is recoverable whatever characters the ids contain.
    pub fn pair_key(a: &str, b: &str) -> String {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        format!("{}:{}{}", low.len(), low, high)
    }

    pub fn new(requester: &str, target: &str, status: FriendStatus, now: i64) -> Self {
        let (low, high) = if requester <= target {
            (requester, target)
        } else {
            (target, requester)
        };
        Self {
            user_low: low.to_string(),
            user_high: high.to_string(),
            requester_id: requester.to_string(),
            status,
            blocked_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    /// The participant that is not `user_id`
    pub fn other(&self, user_id: &str) -> &str {
        if self.user_low == user_id {
            &self.user_high
        } else {
            &self.user_low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClanRole {
    Leader,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clan {
    pub id: String,
    pub name: String,
    pub leader_id: String,
    pub member_count: u32,
    /// Experience earned by members while in the clan
    pub total_experience: u64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanMembership {
    pub clan_id: String,
    pub user_id: String,
    pub role: ClanRole,
    pub contribution: u64,
    /// Global join order, used to break contribution ties
    pub join_seq: u64,
    pub joined_at: i64,
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub total_accounts: usize,
    pub offer_counts: BTreeMap<String, usize>,
    pub friendship_counts: BTreeMap<String, usize>,
    pub total_clans: usize,
    pub total_activities: usize,
}
