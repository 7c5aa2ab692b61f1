// ============================================================================
// Engine: accounts, rewards and the activity log
// ============================================================================

use super::Engine;
use crate::db::{Account, ActivityOutcome};
use crate::progression::LevelProgress;
use crate::reward::ActivityEvent;
use crate::types::{LedgerSnapshot, Result};

impl Engine {
    pub async fn create_account(&self, user_id: &str, starting_coins: u64) -> Result<Account> {
        let _guard = self.lock("create_account", &[user_id]).await?;
        self.db.create_account(user_id, starting_coins)
    }

    pub async fn get_account(&self, user_id: &str) -> Result<Account> {
        self.db.get_account(user_id)
    }

    pub async fn get_balance(&self, user_id: &str) -> Result<u64> {
        Ok(self.db.get_account(user_id)?.coins)
    }

    pub async fn level_progress(&self, user_id: &str) -> Result<LevelProgress> {
        Ok(self.db.get_account(user_id)?.progress())
    }

    /// Apply a coin delta and experience gain atomically
    pub async fn apply_reward(&self, user_id: &str, coins_delta: i64, xp_delta: u64) -> Result<LedgerSnapshot> {
        let _guard = self.lock("apply_reward", &[user_id]).await?;
        self.db.apply_reward(user_id, coins_delta, xp_delta)
    }

    pub async fn debit(&self, user_id: &str, amount: u64) -> Result<u64> {
        let _guard = self.lock("debit", &[user_id]).await?;
        self.db.debit(user_id, amount)
    }

    pub async fn credit(&self, user_id: &str, amount: u64) -> Result<u64> {
        let _guard = self.lock("credit", &[user_id]).await?;
        self.db.credit(user_id, amount)
    }

    /// Compute the reward for `event` and apply it once per activity id
    pub async fn record_activity(&self, user_id: &str, event: &ActivityEvent) -> Result<ActivityOutcome> {
        let _guard = self.lock("record_activity", &[user_id]).await?;
        self.db.record_activity(user_id, event)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::reward::{ActivityEvent, ActivityKind, Difficulty};
    use crate::types::EngineError;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reward_flow() {
        let engine = engine();
        engine.create_account("alice", 0).await.unwrap();

        let event = ActivityEvent::new("quiz-7", ActivityKind::Trivia, 1000, Difficulty::Expert);
        let outcome = engine.record_activity("alice", &event).await.unwrap();
        assert_eq!(outcome.reward.coins, 300);
        assert_eq!(outcome.reward.xp, 600);
        assert_eq!(engine.get_balance("alice").await.unwrap(), 300);

        let progress = engine.level_progress("alice").await.unwrap();
        assert_eq!(progress.remaining, 400);
    }

    #[tokio::test]
    async fn test_overspend_rejected() {
        let engine = engine();
        engine.create_account("alice", 5).await.unwrap();
        assert_eq!(
            engine.apply_reward("alice", -6, 100).await.unwrap_err(),
            EngineError::InsufficientFunds { needed: 6, available: 5 }
        );
        let account = engine.get_account("alice").await.unwrap();
        assert_eq!((account.coins, account.experience), (5, 0));
    }

    #[tokio::test]
    async fn test_held_lock_surfaces_busy() {
        let engine = impatient_engine();
        engine.create_account("alice", 10).await.unwrap();

        let held = engine
            .locks
            .acquire(&["alice"], Duration::from_millis(50))
            .await
            .unwrap();
        let err = engine.credit("alice", 5).await.unwrap_err();
        assert!(matches!(err, EngineError::Busy(_)));
        drop(held);

        assert_eq!(engine.credit("alice", 5).await.unwrap(), 15);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_all_land() {
        let engine = Arc::new(engine());
        engine.create_account("alice", 0).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.credit("alice", 1).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(engine.get_balance("alice").await.unwrap(), 16);
    }
}
