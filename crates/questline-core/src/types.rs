//! ============================================================================
//! Core Types for Questline
//! ============================================================================
//! Error taxonomy shared by every engine operation, plus the small snapshot
//! types returned to callers. Every failed mutation leaves all state exactly
//! as it was before the call.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error types for the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    // Validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid quantity: {0} (must be greater than zero)")]
    InvalidQuantity(u64),

    #[error("Unknown activity kind: {0}")]
    InvalidActivity(String),

    #[error("Unknown difficulty: {0}")]
    InvalidDifficulty(String),

    #[error("Cannot send a friend request to yourself")]
    SelfRequest,

    // Not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Recipe not found: {0}")]
    RecipeNotFound(String),

    #[error("Listing not found: {0}")]
    ListingNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Trade offer not found: {0}")]
    OfferNotFound(String),

    #[error("Clan not found: {0}")]
    ClanNotFound(String),

    #[error("Relationship not found between {0} and {1}")]
    RelationshipNotFound(String, String),

    // Business rules
    #[error("Insufficient funds: need {needed} coins, have {available} coins")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Insufficient quantity of {name}: need {needed}, have {available}")]
    InsufficientQuantity {
        name: String,
        needed: u64,
        available: u64,
    },

    #[error("User {0} is already a clan member")]
    AlreadyMember(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Clan name already taken: {0}")]
    DuplicateName(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Item {0} is no longer owned by the proposer")]
    ItemNoLongerOwned(String),

    // Transient
    #[error("Account busy: {0}")]
    Busy(String),

    #[error("Conflicting update: {0}")]
    Conflict(String),

    // Internal
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected before any mutation
    Validation,
    /// Referenced entity does not exist
    NotFound,
    /// Business rule prevented the mutation
    BusinessRule,
    /// Lock contention; safe to retry
    Transient,
    /// Storage or encoding failure
    Internal,
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::InvalidInput(_)
            | EngineError::InvalidQuantity(_)
            | EngineError::InvalidActivity(_)
            | EngineError::InvalidDifficulty(_)
            | EngineError::SelfRequest => ErrorClass::Validation,

            EngineError::AccountNotFound(_)
            | EngineError::RecipeNotFound(_)
            | EngineError::ListingNotFound(_)
            | EngineError::ItemNotFound(_)
            | EngineError::OfferNotFound(_)
            | EngineError::ClanNotFound(_)
            | EngineError::RelationshipNotFound(_, _) => ErrorClass::NotFound,

            EngineError::InsufficientFunds { .. }
            | EngineError::InsufficientQuantity { .. }
            | EngineError::AlreadyMember(_)
            | EngineError::AlreadyExists(_)
            | EngineError::DuplicateName(_)
            | EngineError::Forbidden(_)
            | EngineError::AlreadyResolved(_)
            | EngineError::ItemNoLongerOwned(_) => ErrorClass::BusinessRule,

            EngineError::Busy(_) | EngineError::Conflict(_) => ErrorClass::Transient,

            EngineError::Storage(_) | EngineError::Serialization(_) => ErrorClass::Internal,
        }
    }

    /// Whether the operation may be retried automatically
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl From<redb::DatabaseError> for EngineError {
    fn from(e: redb::DatabaseError) -> Self {
        EngineError::Storage(format!("Failed to open database: {}", e))
    }
}

impl From<redb::TransactionError> for EngineError {
    fn from(e: redb::TransactionError) -> Self {
        EngineError::Storage(format!("Failed to begin transaction: {}", e))
    }
}

impl From<redb::TableError> for EngineError {
    fn from(e: redb::TableError) -> Self {
        EngineError::Storage(format!("Failed to open table: {}", e))
    }
}

impl From<redb::StorageError> for EngineError {
    fn from(e: redb::StorageError) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for EngineError {
    fn from(e: redb::CommitError) -> Self {
        EngineError::Storage(format!("Failed to commit: {}", e))
    }
}

impl From<bincode::Error> for EngineError {
    fn from(e: bincode::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

/// Ledger state after a successful balance or experience mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub coins: u64,
    pub experience: u64,
    pub level: u32,
    /// Levels gained by the operation that produced this snapshot
    pub levels_gained: u32,
}

/// Reject empty or whitespace-only identity keys before touching storage
pub(crate) fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(EngineError::SelfRequest.class(), ErrorClass::Validation);
        assert_eq!(
            EngineError::RecipeNotFound("x".into()).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            EngineError::InsufficientFunds { needed: 10, available: 5 }.class(),
            ErrorClass::BusinessRule
        );
        assert_eq!(EngineError::Busy("u1".into()).class(), ErrorClass::Transient);
        assert_eq!(
            EngineError::Storage("disk".into()).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(EngineError::Busy("u1".into()).is_retryable());
        assert!(EngineError::Conflict("u1".into()).is_retryable());
        assert!(!EngineError::AlreadyResolved("o1".into()).is_retryable());
        assert!(!EngineError::InsufficientFunds { needed: 1, available: 0 }.is_retryable());
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = EngineError::InsufficientFunds { needed: 100, available: 99 };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: need 100 coins, have 99 coins"
        );
    }

    #[test]
    fn test_require_id() {
        assert!(require_id("user_id", "alice").is_ok());
        assert!(matches!(
            require_id("user_id", "  "),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
