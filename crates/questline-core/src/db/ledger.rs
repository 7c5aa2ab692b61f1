// ============================================================================
// Ledger Operations - balance, experience, level and the activity log
// ============================================================================

use redb::WriteTransaction;
use tracing::{debug, info};

use super::social::credit_clan_contribution;
use super::types::{Account, ActivityOutcome, ActivityRecord};
use super::{load, load_all, now, save, GameDb, ACCOUNTS, ACTIVITIES};
use crate::progression;
use crate::reward::ActivityEvent;
use crate::types::{require_id, EngineError, LedgerSnapshot, Result};

impl GameDb {
    /// Provision a ledger account for an identity key
    pub fn create_account(&self, user_id: &str, starting_coins: u64) -> Result<Account> {
        require_id("user_id", user_id)?;

        let account = self.write(|txn| {
            let mut accounts = txn.open_table(ACCOUNTS)?;
            if load::<Account, _>(&accounts, user_id)?.is_some() {
                return Err(EngineError::AlreadyExists(format!("account {}", user_id)));
            }
            let account = Account::new(user_id, starting_coins, now());
            save(&mut accounts, user_id, &account)?;
            Ok(account)
        })?;

        info!("Created account {} with {} coins", user_id, starting_coins);
        Ok(account)
    }

    pub fn get_account(&self, user_id: &str) -> Result<Account> {
        let txn = self.read()?;
        let accounts = txn.open_table(ACCOUNTS)?;
        load(&accounts, user_id)?.ok_or_else(|| EngineError::AccountNotFound(user_id.to_string()))
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let txn = self.read()?;
        let accounts = txn.open_table(ACCOUNTS)?;
        load_all(&accounts)
    }

    /// Apply a coin delta (may be negative) and an experience gain
    pub fn apply_reward(&self, user_id: &str, coins_delta: i64, xp_delta: u64) -> Result<LedgerSnapshot> {
        let snapshot = self.write(|txn| apply_delta(txn, user_id, i128::from(coins_delta), xp_delta))?;
        info!(
            "Applied reward to {}: coins {:+}, xp +{} -> level {} ({} coins)",
            user_id, coins_delta, xp_delta, snapshot.level, snapshot.coins
        );
        Ok(snapshot)
    }

    /// Remove `amount` coins only if the balance covers it
    pub fn debit(&self, user_id: &str, amount: u64) -> Result<u64> {
        let snapshot = self.write(|txn| apply_delta(txn, user_id, -i128::from(amount), 0))?;
        debug!("Debited {} coins from {}", amount, user_id);
        Ok(snapshot.coins)
    }

    pub fn credit(&self, user_id: &str, amount: u64) -> Result<u64> {
        let snapshot = self.write(|txn| apply_delta(txn, user_id, i128::from(amount), 0))?;
        debug!("Credited {} coins to {}", amount, user_id);
        Ok(snapshot.coins)
    }

    /// Record an activity and apply its reward in one transaction.
    /// A previously recorded activity id is not applied again.
    pub fn record_activity(&self, user_id: &str, event: &ActivityEvent) -> Result<ActivityOutcome> {
        require_id("activity_id", &event.activity_id)?;
        let reward = event.reward()?;

        let outcome = self.write(|txn| {
            {
                let activities = txn.open_table(ACTIVITIES)?;
                if let Some(existing) = load::<ActivityRecord, _>(&activities, &event.activity_id)? {
                    if existing.user_id != user_id {
                        return Err(EngineError::AlreadyExists(format!(
                            "activity {} belongs to another user",
                            event.activity_id
                        )));
                    }
                    let accounts = txn.open_table(ACCOUNTS)?;
                    let account: Account = load(&accounts, user_id)?
                        .ok_or_else(|| EngineError::AccountNotFound(user_id.to_string()))?;
                    return Ok(ActivityOutcome {
                        activity_id: existing.activity_id,
                        reward: existing.reward,
                        snapshot: account.snapshot(0),
                        duplicate: true,
                    });
                }
            }

            let coins = i128::from(reward.coins);
            let snapshot = apply_delta(txn, user_id, coins, reward.xp)?;

            let record = ActivityRecord {
                activity_id: event.activity_id.clone(),
                user_id: user_id.to_string(),
                kind: event.kind,
                raw_score: event.raw_score,
                difficulty: event.difficulty,
                reward,
                recorded_at: now(),
            };
            let mut activities = txn.open_table(ACTIVITIES)?;
            save(&mut activities, &record.activity_id, &record)?;

            Ok(ActivityOutcome {
                activity_id: record.activity_id,
                reward,
                snapshot,
                duplicate: false,
            })
        })?;

        if outcome.duplicate {
            debug!("Activity {} already recorded, reward not reapplied", event.activity_id);
        } else {
            info!(
                "Recorded {} activity {} for {}: +{} coins, +{} xp",
                event.kind, event.activity_id, user_id, reward.coins, reward.xp
            );
        }
        Ok(outcome)
    }

    pub fn get_activity(&self, activity_id: &str) -> Result<Option<ActivityRecord>> {
        let txn = self.read()?;
        let activities = txn.open_table(ACTIVITIES)?;
        load(&activities, activity_id)
    }
}

/// Mutate one account inside an open write transaction.
///
/// Fails with `InsufficientFunds` when the balance would go negative, and
/// with `InvalidInput` when it would overflow. Experience gains are also
/// credited to the user's clan contribution.
pub(crate) fn apply_delta(
    txn: &WriteTransaction,
    user_id: &str,
    coins_delta: i128,
    xp_delta: u64,
) -> Result<LedgerSnapshot> {
    let snapshot = {
        let mut accounts = txn.open_table(ACCOUNTS)?;
        let mut account: Account = load(&accounts, user_id)?
            .ok_or_else(|| EngineError::AccountNotFound(user_id.to_string()))?;

        let new_balance = i128::from(account.coins) + coins_delta;
        if new_balance < 0 {
            return Err(EngineError::InsufficientFunds {
                needed: u64::try_from(-coins_delta).unwrap_or(u64::MAX),
                available: account.coins,
            });
        }
        account.coins = u64::try_from(new_balance)
            .map_err(|_| EngineError::InvalidInput(format!("balance of {} would overflow", user_id)))?;

        let rolled = progression::roll_over(account.level, account.experience, xp_delta)
            .ok_or_else(|| EngineError::InvalidInput(format!("experience of {} would overflow", user_id)))?;
        account.level = rolled.level;
        account.experience = rolled.experience;
        account.updated_at = now();

        save(&mut accounts, user_id, &account)?;
        account.snapshot(rolled.levels_gained)
    };

    if xp_delta > 0 {
        credit_clan_contribution(txn, user_id, xp_delta)?;
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::xp_threshold;
    use crate::reward::{ActivityKind, Difficulty};

    fn db_with(user: &str, coins: u64) -> GameDb {
        let db = GameDb::in_memory().unwrap();
        db.create_account(user, coins).unwrap();
        db
    }

    #[test]
    fn test_create_account_twice_fails() {
        let db = db_with("alice", 0);
        assert!(matches!(
            db.create_account("alice", 50),
            Err(EngineError::AlreadyExists(_))
        ));
        assert_eq!(db.get_account("alice").unwrap().coins, 0);
    }

    #[test]
    fn test_apply_reward_with_rollover() {
        let db = db_with("alice", 0);
        let snap = db.apply_reward("alice", 25, 3500).unwrap();
        assert_eq!(snap.coins, 25);
        assert_eq!(snap.level, 3);
        assert_eq!(snap.experience, 500);
        assert_eq!(snap.levels_gained, 2);
        assert!(snap.experience < xp_threshold(snap.level));
    }

    #[test]
    fn test_overspend_changes_nothing() {
        let db = db_with("alice", 40);
        db.apply_reward("alice", 0, 300).unwrap();

        let err = db.apply_reward("alice", -41, 5000).unwrap_err();
        assert_eq!(err, EngineError::InsufficientFunds { needed: 41, available: 40 });

        let account = db.get_account("alice").unwrap();
        assert_eq!((account.coins, account.experience, account.level), (40, 300, 1));
    }

    #[test]
    fn test_debit_and_credit() {
        let db = db_with("alice", 100);
        assert_eq!(db.debit("alice", 100).unwrap(), 0);
        assert!(matches!(
            db.debit("alice", 1),
            Err(EngineError::InsufficientFunds { needed: 1, available: 0 })
        ));
        assert_eq!(db.credit("alice", 7).unwrap(), 7);
    }

    #[test]
    fn test_credit_overflow_rejected() {
        let db = db_with("alice", u64::MAX);
        assert!(matches!(db.credit("alice", 1), Err(EngineError::InvalidInput(_))));
        assert_eq!(db.get_account("alice").unwrap().coins, u64::MAX);
    }

    #[test]
    fn test_experience_overflow_rejected() {
        let db = db_with("alice", 10);
        db.apply_reward("alice", 0, 300).unwrap();

        assert!(matches!(
            db.apply_reward("alice", 5, u64::MAX),
            Err(EngineError::InvalidInput(_))
        ));
        let account = db.get_account("alice").unwrap();
        assert_eq!((account.coins, account.experience, account.level), (10, 300, 1));

        let event = ActivityEvent::new("huge", ActivityKind::Puzzle, u64::MAX, Difficulty::Expert);
        assert!(matches!(
            db.record_activity("alice", &event),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(db.get_activity("huge").unwrap().is_none());
    }

    #[test]
    fn test_unknown_account() {
        let db = GameDb::in_memory().unwrap();
        assert_eq!(
            db.apply_reward("ghost", 1, 1).unwrap_err(),
            EngineError::AccountNotFound("ghost".into())
        );
    }

    #[test]
    fn test_record_activity_exactly_once() {
        let db = db_with("alice", 0);
        let event = ActivityEvent::new("game-1", ActivityKind::Memory, 100, Difficulty::Hard);

        let first = db.record_activity("alice", &event).unwrap();
        assert!(!first.duplicate);
        assert_eq!(first.snapshot.coins, 20);
        assert_eq!(first.snapshot.experience, 40);

        let second = db.record_activity("alice", &event).unwrap();
        assert!(second.duplicate);
        assert_eq!(second.reward, first.reward);
        assert_eq!(second.snapshot.coins, 20);

        assert_eq!(db.stats().unwrap().total_activities, 1);
    }

    #[test]
    fn test_activity_for_missing_account_not_logged() {
        let db = GameDb::in_memory().unwrap();
        let event = ActivityEvent::new("game-1", ActivityKind::Study, 50, Difficulty::Easy);
        assert!(db.record_activity("ghost", &event).is_err());
        assert!(db.get_activity("game-1").unwrap().is_none());
    }
}
