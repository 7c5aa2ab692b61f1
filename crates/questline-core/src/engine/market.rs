// ============================================================================
// Engine: crafting, store purchases and inventory
// ============================================================================

use tracing::debug;

use super::Engine;
use crate::catalog::ItemTemplate;
use crate::db::{Acquisition, Inventory, ItemInstance, ItemSource, StackableResource};
use crate::types::Result;

impl Engine {
    /// Pay a recipe's cost and receive a fresh instance of its result
    pub async fn craft(&self, user_id: &str, recipe_id: &str) -> Result<Acquisition> {
        let recipe = self.catalog.recipe(recipe_id)?;
        debug!("{} crafting {} for {} coins", user_id, recipe.id, recipe.cost);
        let _guard = self.lock("craft", &[user_id]).await?;
        self.db
            .acquire_item(user_id, recipe.cost, &recipe.result, ItemSource::Crafted)
    }

    /// Pay a listing's price and receive a fresh instance of its item
    pub async fn purchase(&self, user_id: &str, listing_id: &str) -> Result<Acquisition> {
        let listing = self.catalog.listing(listing_id)?;
        debug!("{} buying {} for {} coins", user_id, listing.id, listing.price);
        let _guard = self.lock("purchase", &[user_id]).await?;
        self.db
            .acquire_item(user_id, listing.price, &listing.item, ItemSource::Purchased)
    }

    pub async fn add_stackable(
        &self,
        user_id: &str,
        name: &str,
        item_type: &str,
        quantity: u64,
    ) -> Result<StackableResource> {
        let _guard = self.lock("add_stackable", &[user_id]).await?;
        self.db.add_stackable(user_id, name, item_type, quantity)
    }

    pub async fn consume_stackable(&self, user_id: &str, name: &str, quantity: u64) -> Result<u64> {
        let _guard = self.lock("consume_stackable", &[user_id]).await?;
        self.db.consume_stackable(user_id, name, quantity)
    }

    pub async fn add_unique_instance(&self, user_id: &str, template: &ItemTemplate) -> Result<ItemInstance> {
        let _guard = self.lock("add_unique_instance", &[user_id]).await?;
        self.db.add_unique_instance(user_id, template)
    }

    pub async fn find_owned_item(&self, user_id: &str, item_id: &str) -> Result<ItemInstance> {
        self.db.find_owned_item(user_id, item_id)
    }

    pub async fn inventory(&self, user_id: &str) -> Result<Inventory> {
        self.db.inventory(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::types::EngineError;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_craft_with_exact_balance() {
        let engine = engine();
        engine.create_account("alice", 100).await.unwrap();

        let acq = engine.craft("alice", "xp_boost_small").await.unwrap();
        assert_eq!(acq.coins, 0);
        assert_eq!(acq.item.item_type, "xp_boost");

        let inv = engine.inventory("alice").await.unwrap();
        assert_eq!(inv.instances.len(), 1);
        assert_eq!(inv.instances[0].item_type, "xp_boost");
    }

    #[tokio::test]
    async fn test_craft_one_coin_short() {
        let engine = engine();
        engine.create_account("alice", 99).await.unwrap();

        assert_eq!(
            engine.craft("alice", "xp_boost_small").await.unwrap_err(),
            EngineError::InsufficientFunds { needed: 100, available: 99 }
        );
        assert_eq!(engine.get_balance("alice").await.unwrap(), 99);
        assert!(engine.inventory("alice").await.unwrap().instances.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_crafts_only_one_succeeds() {
        let engine = Arc::new(engine());
        engine.create_account("alice", 100).await.unwrap();

        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.craft("alice", "xp_boost_small").await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.craft("alice", "xp_boost_small").await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(EngineError::InsufficientFunds { .. }))));
        assert_eq!(engine.get_balance("alice").await.unwrap(), 0);
        assert_eq!(engine.inventory("alice").await.unwrap().instances.len(), 1);
    }

    #[tokio::test]
    async fn test_purchase_and_unknown_ids() {
        let engine = engine();
        engine.create_account("alice", 200).await.unwrap();

        let acq = engine.purchase("alice", "avatar_frame_bronze").await.unwrap();
        assert_eq!(acq.coins, 50);
        assert_eq!(
            engine.find_owned_item("alice", &acq.item.id).await.unwrap().name,
            "Bronze Frame"
        );

        assert!(matches!(
            engine.purchase("alice", "dragon").await,
            Err(EngineError::ListingNotFound(_))
        ));
        assert!(matches!(
            engine.craft("alice", "dragon").await,
            Err(EngineError::RecipeNotFound(_))
        ));
        assert_eq!(engine.get_balance("alice").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_stackable_resources() {
        let engine = engine();
        engine.create_account("alice", 0).await.unwrap();
        engine.add_stackable("alice", "gem", "currency", 4).await.unwrap();
        assert_eq!(engine.consume_stackable("alice", "gem", 1).await.unwrap(), 3);
        assert_eq!(
            engine.add_stackable("alice", "gem", "currency", 0).await.unwrap_err(),
            EngineError::InvalidQuantity(0)
        );
    }
}
