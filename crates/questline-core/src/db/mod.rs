// ============================================================================
// GameDb - Embedded Database (redb)
// ============================================================================
// Persistent storage for accounts, inventories, trade offers, the social
// graph and the activity log. Every mutating operation runs as exactly one
// write transaction: committed on success, aborted on any error, so a failed
// call never leaves partial state behind.
// ============================================================================

pub mod types;

mod inventory;
mod ledger;
mod social;
mod trade;

pub use types::{
    Account, Acquisition, ActivityOutcome, ActivityRecord, Clan, ClanMembership, ClanRole,
    DbStats, FriendStatus, Friendship, Inventory, ItemInstance, ItemSource, OfferStatus,
    StackableResource, TradeDecision, TradeOffer,
};

use redb::backends::InMemoryBackend;
use redb::{
    Database, MultimapTableDefinition, ReadTransaction, ReadableMultimapTable, ReadableTable,
    Table, TableDefinition, WriteTransaction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::Result;

// Record tables (key -> bincode blob)
pub(crate) const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");
pub(crate) const INVENTORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("inventories");
pub(crate) const OFFERS: TableDefinition<&str, &[u8]> = TableDefinition::new("offers");
pub(crate) const FRIENDSHIPS: TableDefinition<&str, &[u8]> = TableDefinition::new("friendships");
pub(crate) const CLANS: TableDefinition<&str, &[u8]> = TableDefinition::new("clans");
pub(crate) const MEMBERSHIPS: TableDefinition<&str, &[u8]> = TableDefinition::new("memberships");
pub(crate) const ACTIVITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("activities");

// Lookup tables
pub(crate) const CLAN_NAMES: TableDefinition<&str, &str> = TableDefinition::new("clan_names");
pub(crate) const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

// Secondary indexes
pub(crate) const OFFERS_BY_PROPOSER: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("offers_by_proposer");
pub(crate) const OFFERS_BY_TARGET: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("offers_by_target");
pub(crate) const FRIENDSHIPS_BY_USER: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("friendships_by_user");
pub(crate) const CLAN_MEMBERS: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("clan_members");

type RecordTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

/// Embedded ledger database
pub struct GameDb {
    db: Database,
    path: Option<PathBuf>,
}

impl GameDb {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening ledger database at: {}", path.display());
        let db = Database::create(path)?;
        let store = Self {
            db,
            path: Some(path.to_path_buf()),
        };
        store.ensure_tables()?;
        info!("Ledger database ready");
        Ok(store)
    }

    /// Volatile database, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        let store = Self { db, path: None };
        store.ensure_tables()?;
        debug!("In-memory ledger database ready");
        Ok(store)
    }

    /// Database file path; `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn ensure_tables(&self) -> Result<()> {
        self.write(|txn| {
            txn.open_table(ACCOUNTS)?;
            txn.open_table(INVENTORIES)?;
            txn.open_table(OFFERS)?;
            txn.open_table(FRIENDSHIPS)?;
            txn.open_table(CLANS)?;
            txn.open_table(MEMBERSHIPS)?;
            txn.open_table(ACTIVITIES)?;
            txn.open_table(CLAN_NAMES)?;
            txn.open_table(COUNTERS)?;
            txn.open_multimap_table(OFFERS_BY_PROPOSER)?;
            txn.open_multimap_table(OFFERS_BY_TARGET)?;
            txn.open_multimap_table(FRIENDSHIPS_BY_USER)?;
            txn.open_multimap_table(CLAN_MEMBERS)?;
            Ok(())
        })
    }

    /// Run `f` inside one write transaction. Commits when `f` succeeds,
    /// aborts otherwise.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T>) -> Result<T> {
        let txn = self.db.begin_write()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    warn!("Failed to abort transaction after '{}': {}", e, abort_err);
                }
                Err(e)
            }
        }
    }

    pub(crate) fn read(&self) -> Result<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<DbStats> {
        let txn = self.read()?;

        let accounts = count(&txn.open_table(ACCOUNTS)?)?;
        let clans = count(&txn.open_table(CLANS)?)?;
        let activities = count(&txn.open_table(ACTIVITIES)?)?;

        let mut offers = BTreeMap::new();
        for offer in load_all::<TradeOffer, _>(&txn.open_table(OFFERS)?)? {
            *offers.entry(offer.status.as_str().to_string()).or_insert(0usize) += 1;
        }

        let mut friendships = BTreeMap::new();
        for friendship in load_all::<Friendship, _>(&txn.open_table(FRIENDSHIPS)?)? {
            *friendships
                .entry(friendship.status.as_str().to_string())
                .or_insert(0usize) += 1;
        }

        Ok(DbStats {
            total_accounts: accounts,
            offer_counts: offers,
            friendship_counts: friendships,
            total_clans: clans,
            total_activities: activities,
        })
    }
}

// ============================================================================
// Record helpers
// ============================================================================

pub(crate) fn load<T, R>(table: &R, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(bincode::deserialize(value.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn save<T: Serialize>(table: &mut RecordTable<'_>, key: &str, record: &T) -> Result<()> {
    let bytes = bincode::serialize(record)?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

pub(crate) fn load_all<T, R>(table: &R) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.range::<&str>(..)? {
        let (_key, value) = entry?;
        results.push(bincode::deserialize(value.value())?);
    }
    Ok(results)
}

fn count<R>(table: &R) -> Result<usize>
where
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut n = 0;
    for entry in table.range::<&str>(..)? {
        entry?;
        n += 1;
    }
    Ok(n)
}

/// All values indexed under `key` in a multimap index
pub(crate) fn index_values<R>(index: &R, key: &str) -> Result<Vec<String>>
where
    R: ReadableMultimapTable<&'static str, &'static str>,
{
    let mut values = Vec::new();
    for value in index.get(key)? {
        values.push(value?.value().to_string());
    }
    Ok(values)
}

/// Increment and return the named counter
pub(crate) fn next_sequence(txn: &WriteTransaction, name: &str) -> Result<u64> {
    let mut counters = txn.open_table(COUNTERS)?;
    let current = counters.get(name)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    counters.insert(name, next)?;
    Ok(next)
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_db_starts_empty() {
        let db = GameDb::in_memory().unwrap();
        assert!(db.path().is_none());
        let stats = db.stats().unwrap();
        assert_eq!(stats.total_accounts, 0);
        assert_eq!(stats.total_clans, 0);
        assert!(stats.offer_counts.is_empty());
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let db = GameDb::in_memory().unwrap();
        let result: Result<()> = db.write(|txn| {
            let mut accounts = txn.open_table(ACCOUNTS)?;
            save(&mut accounts, "ghost", &Account::new("ghost", 10, now()))?;
            Err(crate::types::EngineError::Conflict("forced".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.stats().unwrap().total_accounts, 0);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let db = GameDb::in_memory().unwrap();
        let a = db.write(|txn| next_sequence(txn, "seq")).unwrap();
        let b = db.write(|txn| next_sequence(txn, "seq")).unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn test_open_file_database() {
        let path = std::env::temp_dir().join(format!("questline-{}.redb", uuid::Uuid::new_v4()));
        {
            let db = GameDb::open(&path).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
        }
        let _ = std::fs::remove_file(&path);
    }
}
