//! ============================================================================
//! Engine - Lock-scoped entry point for every ledger, market and social op
//! ============================================================================
//! Each mutating call takes the per-account locks of every account it
//! touches (retrying `Busy` with backoff), then performs exactly one
//! `GameDb` write transaction. Reads go straight to redb snapshots.
//! ============================================================================

mod ledger;
mod market;
mod social;
mod trade;

use tracing::info;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::db::{DbStats, GameDb};
use crate::locks::{AccountGuard, AccountLocks};
use crate::retry::retry_transient;
use crate::types::Result;

/// Progression and virtual-economy engine
pub struct Engine {
    db: GameDb,
    catalog: Catalog,
    pub(crate) locks: AccountLocks,
    config: EngineConfig,
}

impl Engine {
    pub fn new(db: GameDb, catalog: Catalog, config: EngineConfig) -> Self {
        Self {
            db,
            catalog,
            locks: AccountLocks::new(),
            config,
        }
    }

    /// Open the database and catalog named by `config`
    pub fn open(config: EngineConfig) -> Result<Self> {
        let path = config.resolve_db_path()?;
        let db = GameDb::open(&path)?;
        let catalog = match &config.catalog_path {
            Some(path) => Catalog::load(path)?,
            None => Catalog::builtin(),
        };
        info!(
            "Engine ready (db: {}, lock timeout: {}ms)",
            path.display(),
            config.lock_timeout_ms
        );
        Ok(Self::new(db, catalog, config))
    }

    /// Engine over a volatile database with the built-in catalog
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Ok(Self::new(GameDb::in_memory()?, Catalog::builtin(), config))
    }

    pub fn db(&self) -> &GameDb {
        &self.db
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> Result<DbStats> {
        self.db.stats()
    }

    /// Lock `accounts` for one operation, retrying while they are busy
    async fn lock(&self, label: &str, accounts: &[&str]) -> Result<AccountGuard> {
        let wait = self.config.lock_timeout();
        let locks = &self.locks;
        retry_transient(&self.config.retry, label, move || locks.acquire(accounts, wait)).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::retry::RetryConfig;

    pub fn engine() -> Engine {
        Engine::in_memory(EngineConfig::default()).unwrap()
    }

    /// Engine that gives up on a held lock quickly
    pub fn impatient_engine() -> Engine {
        let config = EngineConfig {
            lock_timeout_ms: 20,
            retry: RetryConfig {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
                jitter: false,
            },
            ..Default::default()
        };
        Engine::in_memory(config).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_stats_track_engine_activity() {
        let engine = engine();
        engine.create_account("alice", 10).await.unwrap();
        engine.create_account("bob", 10).await.unwrap();
        engine.send_friend_request("alice", "bob").await.unwrap();

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_accounts, 2);
        assert_eq!(stats.friendship_counts.get("pending"), Some(&1));
    }

    #[tokio::test]
    async fn test_open_with_file_path() {
        let path = std::env::temp_dir().join(format!("questline-engine-{}.redb", uuid::Uuid::new_v4()));
        let config = EngineConfig {
            db_path: Some(path.clone()),
            ..Default::default()
        };
        {
            let engine = Engine::open(config).unwrap();
            assert_eq!(engine.db().path(), Some(path.as_path()));
            assert!(engine.catalog().recipe("xp_boost_small").is_ok());
        }
        let _ = std::fs::remove_file(&path);
    }
}
