//! ============================================================================
//! Account Locks - Per-account exclusive locks with acquisition timeout
//! ============================================================================
//! Every balance-affecting operation holds the locks of all accounts it
//! touches for its whole read-validate-write. Multi-account operations take
//! locks in ascending id order so two transfers can never deadlock.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::debug;

use crate::types::{EngineError, Result};

/// Registry size above which idle lock entries are evicted
const MAX_IDLE_LOCKS: usize = 4096;

/// Guards for a set of account locks; released on drop
#[derive(Debug)]
pub struct AccountGuard {
    accounts: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuard {
    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }
}

/// Registry of per-account mutexes
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the locks for every id in `accounts` (duplicates ignored),
    /// in ascending order. Fails with `Busy` when `wait` elapses first.
    pub async fn acquire(&self, accounts: &[&str], wait: Duration) -> Result<AccountGuard> {
        let mut ordered: Vec<String> = accounts.iter().map(|a| a.to_string()).collect();
        ordered.sort();
        ordered.dedup();

        let mutexes = self.mutexes_for(&ordered).await;

        let acquire_all = async {
            let mut guards = Vec::with_capacity(mutexes.len());
            for mutex in mutexes {
                guards.push(mutex.lock_owned().await);
            }
            guards
        };

        match timeout(wait, acquire_all).await {
            Ok(guards) => {
                debug!("Locked accounts {:?}", ordered);
                Ok(AccountGuard {
                    accounts: ordered,
                    _guards: guards,
                })
            }
            Err(_) => {
                debug!("Timed out after {:?} waiting for {:?}", wait, ordered);
                Err(EngineError::Busy(ordered.join(",")))
            }
        }
    }

    /// Number of registered lock entries
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn mutexes_for(&self, ordered: &[String]) -> Vec<Arc<Mutex<()>>> {
        let mut registry = self.locks.lock().await;

        if registry.len() >= MAX_IDLE_LOCKS {
            // Entries only referenced by the registry are not held by anyone
            let before = registry.len();
            registry.retain(|_, m| Arc::strong_count(m) > 1);
            debug!("Evicted {} idle account locks", before - registry.len());
        }

        ordered
            .iter()
            .map(|id| {
                registry
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_sorts_and_dedups() {
        let locks = AccountLocks::new();
        let guard = locks
            .acquire(&["bob", "alice", "bob"], Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(guard.accounts(), &["alice".to_string(), "bob".to_string()]);
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn test_held_lock_times_out_as_busy() {
        let locks = AccountLocks::new();
        let _held = locks.acquire(&["alice"], Duration::from_millis(50)).await.unwrap();

        let err = locks
            .acquire(&["alice", "bob"], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let locks = AccountLocks::new();
        {
            let _guard = locks.acquire(&["alice"], Duration::from_millis(50)).await.unwrap();
        }
        assert!(locks.acquire(&["alice"], Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn test_disjoint_accounts_do_not_block() {
        let locks = AccountLocks::new();
        let _a = locks.acquire(&["alice"], Duration::from_millis(50)).await.unwrap();
        assert!(locks.acquire(&["bob"], Duration::from_millis(50)).await.is_ok());
    }
}
