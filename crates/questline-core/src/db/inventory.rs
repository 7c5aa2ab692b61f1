// ============================================================================
// Inventory Operations - stackable resources and unique item instances
// ============================================================================

use redb::WriteTransaction;
use tracing::{debug, info};

use super::ledger::apply_delta;
use super::types::{Account, Acquisition, Inventory, ItemInstance, ItemSource, StackableResource};
use super::{load, now, save, GameDb, ACCOUNTS, INVENTORIES};
use crate::catalog::ItemTemplate;
use crate::types::{require_id, EngineError, Result};

impl GameDb {
    /// Inventory of `user_id`; empty if nothing was ever acquired
    pub fn inventory(&self, user_id: &str) -> Result<Inventory> {
        let txn = self.read()?;
        let accounts = txn.open_table(ACCOUNTS)?;
        if load::<Account, _>(&accounts, user_id)?.is_none() {
            return Err(EngineError::AccountNotFound(user_id.to_string()));
        }
        let inventories = txn.open_table(INVENTORIES)?;
        Ok(load(&inventories, user_id)?.unwrap_or_else(|| Inventory::new(user_id)))
    }

    /// Item instance owned by `user_id`
    pub fn find_owned_item(&self, user_id: &str, item_id: &str) -> Result<ItemInstance> {
        let txn = self.read()?;
        let inventories = txn.open_table(INVENTORIES)?;
        let inventory: Option<Inventory> = load(&inventories, user_id)?;
        inventory
            .and_then(|inv| inv.find_instance(item_id).cloned())
            .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))
    }

    pub fn add_stackable(
        &self,
        user_id: &str,
        name: &str,
        item_type: &str,
        quantity: u64,
    ) -> Result<StackableResource> {
        require_id("name", name)?;
        if quantity == 0 {
            return Err(EngineError::InvalidQuantity(quantity));
        }

        let stack = self.write(|txn| {
            let mut inventory = load_inventory(txn, user_id)?;
            let stack = inventory.add_stack(name, item_type, quantity, now())?;
            save_inventory(txn, &inventory)?;
            Ok(stack)
        })?;

        debug!("{} now holds {} x {}", user_id, stack.quantity, name);
        Ok(stack)
    }

    /// Returns the remaining quantity; the stack is removed at zero
    pub fn consume_stackable(&self, user_id: &str, name: &str, quantity: u64) -> Result<u64> {
        if quantity == 0 {
            return Err(EngineError::InvalidQuantity(quantity));
        }

        let remaining = self.write(|txn| {
            let mut inventory = load_inventory(txn, user_id)?;
            let remaining = inventory.consume_stack(name, quantity, now())?;
            save_inventory(txn, &inventory)?;
            Ok(remaining)
        })?;

        debug!("{} consumed {} x {} ({} left)", user_id, quantity, name, remaining);
        Ok(remaining)
    }

    /// Grant a fresh instance of `template` without payment
    pub fn add_unique_instance(&self, user_id: &str, template: &ItemTemplate) -> Result<ItemInstance> {
        let item = self.write(|txn| {
            let mut inventory = load_inventory(txn, user_id)?;
            let item = ItemInstance::from_template(template, ItemSource::Granted, now());
            inventory.instances.push(item.clone());
            save_inventory(txn, &inventory)?;
            Ok(item)
        })?;

        info!("Granted {} ({}) to {}", item.name, item.id, user_id);
        Ok(item)
    }

    /// Debit `cost` and add a new instance of `template` in one transaction.
    /// Shared by crafting and purchasing.
    pub fn acquire_item(
        &self,
        user_id: &str,
        cost: u64,
        template: &ItemTemplate,
        source: ItemSource,
    ) -> Result<Acquisition> {
        let acquisition = self.write(|txn| {
            let snapshot = apply_delta(txn, user_id, -i128::from(cost), 0)?;

            let mut inventory = load_inventory(txn, user_id)?;
            let item = ItemInstance::from_template(template, source, now());
            inventory.instances.push(item.clone());
            save_inventory(txn, &inventory)?;

            Ok(Acquisition {
                item,
                coins: snapshot.coins,
            })
        })?;

        info!(
            "{} acquired {} for {} coins ({} left)",
            user_id, acquisition.item.name, cost, acquisition.coins
        );
        Ok(acquisition)
    }
}

/// Load an inventory inside a write transaction, requiring the account
pub(crate) fn load_inventory(txn: &WriteTransaction, user_id: &str) -> Result<Inventory> {
    {
        let accounts = txn.open_table(ACCOUNTS)?;
        if load::<Account, _>(&accounts, user_id)?.is_none() {
            return Err(EngineError::AccountNotFound(user_id.to_string()));
        }
    }
    let inventories = txn.open_table(INVENTORIES)?;
    Ok(load(&inventories, user_id)?.unwrap_or_else(|| Inventory::new(user_id)))
}

pub(crate) fn save_inventory(txn: &WriteTransaction, inventory: &Inventory) -> Result<()> {
    let mut inventories = txn.open_table(INVENTORIES)?;
    save(&mut inventories, &inventory.owner, inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn template() -> ItemTemplate {
        Catalog::builtin()
            .recipe("xp_boost_small")
            .map(|r| r.result.clone())
            .unwrap()
    }

    #[test]
    fn test_acquire_exact_balance() {
        let db = GameDb::in_memory().unwrap();
        db.create_account("alice", 100).unwrap();

        let acq = db
            .acquire_item("alice", 100, &template(), ItemSource::Crafted)
            .unwrap();
        assert_eq!(acq.coins, 0);
        assert_eq!(acq.item.source, ItemSource::Crafted);

        let inv = db.inventory("alice").unwrap();
        assert_eq!(inv.instances.len(), 1);
        assert_eq!(db.find_owned_item("alice", &acq.item.id).unwrap().id, acq.item.id);
        assert!(matches!(
            db.find_owned_item("alice", "missing"),
            Err(EngineError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_acquire_short_by_one_changes_nothing() {
        let db = GameDb::in_memory().unwrap();
        db.create_account("alice", 99).unwrap();

        let err = db
            .acquire_item("alice", 100, &template(), ItemSource::Crafted)
            .unwrap_err();
        assert_eq!(err, EngineError::InsufficientFunds { needed: 100, available: 99 });
        assert_eq!(db.get_account("alice").unwrap().coins, 99);
        assert!(db.inventory("alice").unwrap().instances.is_empty());
    }

    #[test]
    fn test_instances_never_merge() {
        let db = GameDb::in_memory().unwrap();
        db.create_account("alice", 0).unwrap();
        let a = db.add_unique_instance("alice", &template()).unwrap();
        let b = db.add_unique_instance("alice", &template()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(db.inventory("alice").unwrap().instances.len(), 2);
    }

    #[test]
    fn test_stackables() {
        let db = GameDb::in_memory().unwrap();
        db.create_account("alice", 0).unwrap();
        db.add_stackable("alice", "gem", "currency", 3).unwrap();
        assert_eq!(db.add_stackable("alice", "gem", "currency", 2).unwrap().quantity, 5);

        assert!(matches!(
            db.consume_stackable("alice", "gem", 6),
            Err(EngineError::InsufficientQuantity { needed: 6, available: 5, .. })
        ));
        assert_eq!(db.consume_stackable("alice", "gem", 5).unwrap(), 0);
        assert!(db.inventory("alice").unwrap().stacks.is_empty());
        assert!(matches!(
            db.consume_stackable("alice", "gem", 1),
            Err(EngineError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_inventory_requires_account() {
        let db = GameDb::in_memory().unwrap();
        assert!(matches!(db.inventory("ghost"), Err(EngineError::AccountNotFound(_))));
        assert!(matches!(
            db.add_stackable("ghost", "gem", "currency", 1),
            Err(EngineError::AccountNotFound(_))
        ));
    }
}
