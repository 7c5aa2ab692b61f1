// ============================================================================
// Catalog - Crafting recipes and marketplace listings
// ============================================================================
// Immutable lookup tables, loaded once at start-up either from the built-in
// set or from a JSON document:
//
//   { "recipes":  [ { "id", "name", "cost", "result": ItemTemplate } ],
//     "listings": [ { "id", "price", "item": ItemTemplate } ] }
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::types::{EngineError, Result};

/// Rarity tier for items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl ItemRarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

/// Blueprint for the item a recipe or listing produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub name: String,
    pub item_type: String,
    pub rarity: ItemRarity,
    /// Effect strength, e.g. percentage bonus for boosts
    #[serde(default)]
    pub power: Option<u32>,
    /// Effect duration in seconds
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Number of times the item can be used
    #[serde(default)]
    pub uses: Option<u32>,
}

/// A crafting recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub cost: u64,
    pub result: ItemTemplate,
}

/// A marketplace listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub price: u64,
    pub item: ItemTemplate,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    recipes: Vec<Recipe>,
    #[serde(default)]
    listings: Vec<Listing>,
}

/// Read-only recipe and listing tables
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    recipes: HashMap<String, Recipe>,
    listings: HashMap<String, Listing>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids
    pub fn new(recipes: Vec<Recipe>, listings: Vec<Listing>) -> Result<Self> {
        let mut catalog = Catalog::default();
        for recipe in recipes {
            if catalog.recipes.contains_key(&recipe.id) {
                return Err(EngineError::InvalidInput(format!(
                    "duplicate recipe id '{}'",
                    recipe.id
                )));
            }
            catalog.recipes.insert(recipe.id.clone(), recipe);
        }
        for listing in listings {
            if catalog.listings.contains_key(&listing.id) {
                return Err(EngineError::InvalidInput(format!(
                    "duplicate listing id '{}'",
                    listing.id
                )));
            }
            catalog.listings.insert(listing.id.clone(), listing);
        }
        Ok(catalog)
    }

    /// Parse a catalog from its JSON representation
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::new(doc.recipes, doc.listings)
    }

    /// Load a catalog file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidInput(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&json)?;
        info!(
            "Loaded catalog from {} ({} recipes, {} listings)",
            path.display(),
            catalog.recipes.len(),
            catalog.listings.len()
        );
        Ok(catalog)
    }

    /// The catalog shipped with the engine
    pub fn builtin() -> Self {
        let recipes = vec![
            recipe("xp_boost_small", "Small XP Boost", 100, template("Small XP Boost", "xp_boost", ItemRarity::Common, Some(10), Some(3600), Some(1))),
            recipe("xp_boost_large", "Large XP Boost", 500, template("Large XP Boost", "xp_boost", ItemRarity::Rare, Some(50), Some(3600), Some(1))),
            recipe("coin_magnet", "Coin Magnet", 250, template("Coin Magnet", "coin_boost", ItemRarity::Uncommon, Some(25), Some(7200), Some(1))),
            recipe("streak_shield", "Streak Shield", 300, template("Streak Shield", "streak_shield", ItemRarity::Rare, None, None, Some(1))),
        ];
        let listings = vec![
            listing("avatar_frame_bronze", 150, template("Bronze Frame", "cosmetic", ItemRarity::Common, None, None, None)),
            listing("avatar_frame_gold", 1200, template("Gold Frame", "cosmetic", ItemRarity::Epic, None, None, None)),
            listing("title_scholar", 400, template("Scholar Title", "title", ItemRarity::Uncommon, None, None, None)),
            listing("hint_pack", 80, template("Hint Pack", "consumable", ItemRarity::Common, None, None, Some(5))),
        ];

        let mut catalog = Catalog::default();
        for r in recipes {
            catalog.recipes.insert(r.id.clone(), r);
        }
        for l in listings {
            catalog.listings.insert(l.id.clone(), l);
        }
        catalog
    }

    pub fn recipe(&self, id: &str) -> Result<&Recipe> {
        self.recipes
            .get(id)
            .ok_or_else(|| EngineError::RecipeNotFound(id.to_string()))
    }

    pub fn listing(&self, id: &str) -> Result<&Listing> {
        self.listings
            .get(id)
            .ok_or_else(|| EngineError::ListingNotFound(id.to_string()))
    }

    /// Recipes sorted by id
    pub fn recipes(&self) -> Vec<&Recipe> {
        let mut all: Vec<_> = self.recipes.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Listings sorted by id
    pub fn listings(&self) -> Vec<&Listing> {
        let mut all: Vec<_> = self.listings.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

fn template(
    name: &str,
    item_type: &str,
    rarity: ItemRarity,
    power: Option<u32>,
    duration_secs: Option<u64>,
    uses: Option<u32>,
) -> ItemTemplate {
    ItemTemplate {
        name: name.to_string(),
        item_type: item_type.to_string(),
        rarity,
        power,
        duration_secs,
        uses,
    }
}

fn recipe(id: &str, name: &str, cost: u64, result: ItemTemplate) -> Recipe {
    Recipe {
        id: id.to_string(),
        name: name.to_string(),
        cost,
        result,
    }
}

fn listing(id: &str, price: u64, item: ItemTemplate) -> Listing {
    Listing {
        id: id.to_string(),
        price,
        item,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_xp_boost_small() {
        let catalog = Catalog::builtin();
        let recipe = catalog.recipe("xp_boost_small").unwrap();
        assert_eq!(recipe.cost, 100);
        assert_eq!(recipe.result.item_type, "xp_boost");
    }

    #[test]
    fn test_missing_ids() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.recipe("nope").unwrap_err(),
            EngineError::RecipeNotFound("nope".into())
        );
        assert_eq!(
            catalog.listing("nope").unwrap_err(),
            EngineError::ListingNotFound("nope".into())
        );
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "recipes": [
                { "id": "torch", "name": "Torch", "cost": 5,
                  "result": { "name": "Torch", "item_type": "tool", "rarity": "common", "uses": 3 } }
            ],
            "listings": [
                { "id": "crown", "price": 900,
                  "item": { "name": "Crown", "item_type": "cosmetic", "rarity": "legendary" } }
            ]
        }"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.recipe("torch").unwrap().result.uses, Some(3));
        assert_eq!(catalog.listing("crown").unwrap().item.rarity, ItemRarity::Legendary);
        assert_eq!(catalog.recipes().len(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{ "listings": [
            { "id": "a", "price": 1, "item": { "name": "A", "item_type": "x", "rarity": "common" } },
            { "id": "a", "price": 2, "item": { "name": "A", "item_type": "x", "rarity": "common" } }
        ] }"#;
        assert!(matches!(
            Catalog::from_json(json),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_listings_sorted() {
        let catalog = Catalog::builtin();
        let ids: Vec<_> = catalog.listings().iter().map(|l| l.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
