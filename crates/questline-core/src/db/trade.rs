// ============================================================================
// Trade Workflow - item-for-coins offers between two accounts
// ============================================================================
// pending -> accepted | rejected | cancelled
//
// Acceptance re-validates ownership and moves coins and the item in the same
// transaction that marks the offer accepted. Any failure leaves the offer
// pending and both accounts untouched.
// ============================================================================

use redb::WriteTransaction;
use tracing::info;

use super::inventory::{load_inventory, save_inventory};
use super::ledger::apply_delta;
use super::types::{Account, Inventory, ItemSource, OfferStatus, TradeDecision, TradeOffer};
use super::{
    index_values, load, now, save, GameDb, ACCOUNTS, INVENTORIES, OFFERS, OFFERS_BY_PROPOSER,
    OFFERS_BY_TARGET,
};
use crate::types::{require_id, EngineError, Result};

impl GameDb {
    pub fn create_offer(
        &self,
        proposer_id: &str,
        target_id: &str,
        item_id: &str,
        requested_coins: u64,
    ) -> Result<TradeOffer> {
        require_id("proposer_id", proposer_id)?;
        require_id("target_id", target_id)?;
        if proposer_id == target_id {
            return Err(EngineError::InvalidInput("cannot trade with yourself".into()));
        }

        let offer = self.write(|txn| {
            {
                let accounts = txn.open_table(ACCOUNTS)?;
                for user_id in [proposer_id, target_id] {
                    if load::<Account, _>(&accounts, user_id)?.is_none() {
                        return Err(EngineError::AccountNotFound(user_id.to_string()));
                    }
                }
            }

            let item = {
                let inventories = txn.open_table(INVENTORIES)?;
                let inventory: Option<Inventory> = load(&inventories, proposer_id)?;
                inventory
                    .and_then(|inv| inv.find_instance(item_id).cloned())
                    .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))?
            };

            let offer = TradeOffer {
                id: uuid::Uuid::new_v4().to_string(),
                proposer_id: proposer_id.to_string(),
                target_id: target_id.to_string(),
                item_id: item.id,
                item_name: item.name,
                item_type: item.item_type,
                requested_coins,
                status: OfferStatus::Pending,
                created_at: now(),
                resolved_at: None,
            };

            let mut offers = txn.open_table(OFFERS)?;
            save(&mut offers, &offer.id, &offer)?;
            let mut by_proposer = txn.open_multimap_table(OFFERS_BY_PROPOSER)?;
            by_proposer.insert(proposer_id, offer.id.as_str())?;
            let mut by_target = txn.open_multimap_table(OFFERS_BY_TARGET)?;
            by_target.insert(target_id, offer.id.as_str())?;
            Ok(offer)
        })?;

        info!(
            "Trade offer {}: {} offers {} to {} for {} coins",
            offer.id, proposer_id, offer.item_name, target_id, requested_coins
        );
        Ok(offer)
    }

    pub fn get_offer(&self, offer_id: &str) -> Result<TradeOffer> {
        let txn = self.read()?;
        let offers = txn.open_table(OFFERS)?;
        load(&offers, offer_id)?.ok_or_else(|| EngineError::OfferNotFound(offer_id.to_string()))
    }

    /// Apply `decision` on behalf of `acting_user`
    pub fn resolve_offer(
        &self,
        offer_id: &str,
        acting_user: &str,
        decision: TradeDecision,
    ) -> Result<TradeOffer> {
        let offer = self.write(|txn| {
            let mut offer: TradeOffer = {
                let offers = txn.open_table(OFFERS)?;
                load(&offers, offer_id)?
                    .ok_or_else(|| EngineError::OfferNotFound(offer_id.to_string()))?
            };

            if offer.status.is_terminal() {
                return Err(EngineError::AlreadyResolved(format!(
                    "offer {} is {}",
                    offer_id,
                    offer.status.as_str()
                )));
            }

            let allowed = match decision {
                TradeDecision::Accept | TradeDecision::Reject => offer.target_id == acting_user,
                TradeDecision::Cancel => offer.proposer_id == acting_user,
            };
            if !allowed {
                return Err(EngineError::Forbidden(format!(
                    "{} may not {:?} offer {}",
                    acting_user, decision, offer_id
                )));
            }

            if decision == TradeDecision::Accept {
                settle(txn, &offer)?;
            }

            offer.status = decision.resulting_status();
            offer.resolved_at = Some(now());
            let mut offers = txn.open_table(OFFERS)?;
            save(&mut offers, offer_id, &offer)?;
            Ok(offer)
        })?;

        info!(
            "Trade offer {} {} by {}",
            offer.id,
            offer.status.as_str(),
            acting_user
        );
        Ok(offer)
    }

    /// Offers proposed by `user_id`, oldest first
    pub fn offers_made(&self, user_id: &str) -> Result<Vec<TradeOffer>> {
        self.indexed_offers(user_id, true)
    }

    /// Offers addressed to `user_id`, oldest first
    pub fn offers_received(&self, user_id: &str) -> Result<Vec<TradeOffer>> {
        self.indexed_offers(user_id, false)
    }

    fn indexed_offers(&self, user_id: &str, made: bool) -> Result<Vec<TradeOffer>> {
        let txn = self.read()?;
        let ids = if made {
            index_values(&txn.open_multimap_table(OFFERS_BY_PROPOSER)?, user_id)?
        } else {
            index_values(&txn.open_multimap_table(OFFERS_BY_TARGET)?, user_id)?
        };

        let offers = txn.open_table(OFFERS)?;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(offer) = load::<TradeOffer, _>(&offers, &id)? {
                results.push(offer);
            }
        }
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(results)
    }
}

/// Move coins and the item for an accepted offer
fn settle(txn: &WriteTransaction, offer: &TradeOffer) -> Result<()> {
    let mut seller = load_inventory(txn, &offer.proposer_id)?;
    let mut item = seller
        .take_instance(&offer.item_id)
        .ok_or_else(|| EngineError::ItemNoLongerOwned(offer.item_id.clone()))?;

    let price = i128::from(offer.requested_coins);
    apply_delta(txn, &offer.target_id, -price, 0)?;
    apply_delta(txn, &offer.proposer_id, price, 0)?;

    let mut buyer = load_inventory(txn, &offer.target_id)?;
    item.source = ItemSource::Traded;
    item.acquired_at = now();
    buyer.instances.push(item);

    save_inventory(txn, &seller)?;
    save_inventory(txn, &buyer)?;
    Ok(())
}
