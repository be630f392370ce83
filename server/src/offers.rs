//! Offer service: creation, reads and the single status-change entry point.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::error::OfferError;
use crate::events::{EventBus, OfferEvent};
use crate::models::{Actor, NewOffer, Offer, OfferFilter, OfferStatus};
use crate::store::MarketStore;
use crate::transition::{self, DEFAULT_AUTO_COMPLETE_DAYS};

/// Offer service
pub struct OfferService {
    store: Arc<dyn MarketStore>,
    events: EventBus,
    auto_complete_after: Duration,
}

impl OfferService {
    pub fn new(store: Arc<dyn MarketStore>, events: EventBus) -> Self {
        Self {
            store,
            events,
            auto_complete_after: Duration::days(DEFAULT_AUTO_COMPLETE_DAYS),
        }
    }

    /// Override the buyer confirmation window.
    pub fn with_auto_complete_after(mut self, window: Duration) -> Self {
        self.auto_complete_after = window;
        self
    }

    pub fn store(&self) -> &Arc<dyn MarketStore> {
        &self.store
    }

    /// Open a new `pending` offer from buyer to seller.
    ///
    /// # Errors
    /// `Validation` when parties coincide, amounts are not positive, the
    /// unit is blank or `valid_until` is not in the future.
    pub async fn create_offer(
        &self,
        mut new: NewOffer,
        now: DateTime<Utc>,
    ) -> Result<Offer, OfferError> {
        new.unit = new.unit.trim().to_string();
        new.message = new
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        new.validate()?;

        if new.buyer_id == new.seller_id {
            return Err(OfferError::Validation(
                "buyer and seller must be different users".to_string(),
            ));
        }
        if new.valid_until.is_some_and(|deadline| deadline <= now) {
            return Err(OfferError::Validation(
                "valid_until must be in the future".to_string(),
            ));
        }

        let offer = Offer {
            id: Uuid::new_v4(),
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            product_id: new.product_id,
            conversation_id: new.conversation_id,
            price: new.price,
            quantity: new.quantity,
            unit: new.unit,
            message: new.message,
            delivery_location: new.delivery_location,
            delivery_address: new.delivery_address,
            delivery_options: new.delivery_options,
            payment_method: new.payment_method,
            payment_terms: new.payment_terms,
            status: OfferStatus::Pending,
            valid_until: new.valid_until,
            auto_complete_at: None,
            cancelled_by: None,
            cancelled_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_offer(&offer).await?;
        tracing::info!(
            offer_id = %offer.id,
            buyer_id = %offer.buyer_id,
            seller_id = %offer.seller_id,
            product_id = %offer.product_id,
            "Offer created"
        );

        Ok(offer)
    }

    /// Fetch an offer without access checks (internal callers only).
    pub async fn find_offer(&self, offer_id: Uuid) -> Result<Offer, OfferError> {
        self.store
            .get_offer(offer_id)
            .await?
            .ok_or(OfferError::NotFound)
    }

    /// Fetch an offer on behalf of `viewer_id`, who must be buyer or seller.
    pub async fn get_offer(&self, offer_id: Uuid, viewer_id: Uuid) -> Result<Offer, OfferError> {
        let offer = self.find_offer(offer_id).await?;
        if !offer.is_party(viewer_id) {
            return Err(OfferError::NotAParty);
        }
        Ok(offer)
    }

    pub async fn list_offers(&self, filter: &OfferFilter) -> Result<Vec<Offer>, OfferError> {
        Ok(self.store.list_offers(filter).await?)
    }

    /// Move an offer to `requested` on behalf of `actor`.
    ///
    /// The write is conditional on the status read here; if another request
    /// changed it in between, this call loses with `StaleState`.
    pub async fn transition(
        &self,
        offer_id: Uuid,
        actor: Actor,
        requested: OfferStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Offer, OfferError> {
        let offer = self.find_offer(offer_id).await?;
        let from = offer.status;
        let update = transition::plan(
            &offer,
            actor,
            requested,
            reason,
            now,
            self.auto_complete_after,
        )?;

        let Some(updated) = self.store.apply_transition(offer_id, from, &update).await? else {
            tracing::warn!(
                offer_id = %offer_id,
                expected = %from,
                requested = %requested,
                actor = %actor,
                "Offer changed concurrently, transition rejected"
            );
            return Err(OfferError::StaleState {
                offer_id,
                expected: from,
            });
        };

        tracing::info!(
            offer_id = %offer_id,
            from = %from,
            to = %updated.status,
            actor = %actor,
            "Offer transitioned"
        );

        self.events.publish(OfferEvent {
            offer_id,
            buyer_id: updated.buyer_id,
            seller_id: updated.seller_id,
            conversation_id: updated.conversation_id,
            from_status: from,
            to_status: updated.status,
            actor,
            timestamp: now,
        });

        Ok(updated)
    }
}
