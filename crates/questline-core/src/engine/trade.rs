// ============================================================================
// Engine: trade offers
// ============================================================================

use super::Engine;
use crate::db::{TradeDecision, TradeOffer};
use crate::types::Result;

impl Engine {
    pub async fn create_offer(
        &self,
        proposer_id: &str,
        target_id: &str,
        item_id: &str,
        requested_coins: u64,
    ) -> Result<TradeOffer> {
        let _guard = self.lock("create_offer", &[proposer_id]).await?;
        self.db
            .create_offer(proposer_id, target_id, item_id, requested_coins)
    }

    /// Accept, reject or cancel an offer. Both parties are locked; the
    /// offer is re-read under the locks before anything is decided.
    pub async fn resolve_offer(
        &self,
        offer_id: &str,
        acting_user: &str,
        decision: TradeDecision,
    ) -> Result<TradeOffer> {
        let offer = self.db.get_offer(offer_id)?;
        let _guard = self
            .lock(
                "resolve_offer",
                &[offer.proposer_id.as_str(), offer.target_id.as_str()],
            )
            .await?;
        self.db.resolve_offer(offer_id, acting_user, decision)
    }

    pub async fn get_offer(&self, offer_id: &str) -> Result<TradeOffer> {
        self.db.get_offer(offer_id)
    }

    pub async fn offers_made(&self, user_id: &str) -> Result<Vec<TradeOffer>> {
        self.db.offers_made(user_id)
    }

    pub async fn offers_received(&self, user_id: &str) -> Result<Vec<TradeOffer>> {
        self.db.offers_received(user_id)
    }
}
