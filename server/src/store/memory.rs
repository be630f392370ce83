//! In-memory store for tests and local runs.
//!
//! Not durable: all state lives in one process and is lost on exit. Every
//! operation takes the single lock once, so each call is atomic exactly as
//! the Postgres conditional updates are.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{OfferStore, ReviewStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{Offer, OfferFilter, OfferStatus, RatingSummary, Review, ReviewInsert};
use crate::transition::OfferUpdate;

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    rating_sum: i64,
    total_reviews: i64,
}

#[derive(Debug, Default)]
struct State {
    offers: HashMap<Uuid, Offer>,
    reviews: Vec<Review>,
    totals: HashMap<Uuid, Totals>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Poisoned
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferStore for InMemoryStore {
    async fn insert_offer(&self, offer: &Offer) -> StoreResult<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn get_offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.offers.get(&id).cloned())
    }

    async fn list_offers(&self, filter: &OfferFilter) -> StoreResult<Vec<Offer>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut offers: Vec<Offer> = state
            .offers
            .values()
            .filter(|offer| filter.matches(offer))
            .cloned()
            .collect();
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(offers
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        expected: OfferStatus,
        update: &OfferUpdate,
    ) -> StoreResult<Option<Offer>> {
        let mut state = self.state.write().map_err(poison_err)?;
        match state.offers.get_mut(&id) {
            Some(offer) if offer.status == expected => {
                update.apply_to(offer);
                Ok(Some(offer.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn due_expirations(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut due: Vec<(DateTime<Utc>, Uuid)> = state
            .offers
            .values()
            .filter(|o| o.status == OfferStatus::Pending)
            .filter_map(|o| o.valid_until.filter(|d| *d < now).map(|d| (d, o.id)))
            .collect();
        due.sort();
        Ok(due.into_iter().take(limit.max(0) as usize).map(|(_, id)| id).collect())
    }

    async fn due_auto_completions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut due: Vec<(DateTime<Utc>, Uuid)> = state
            .offers
            .values()
            .filter(|o| o.status == OfferStatus::ToReceive)
            .filter_map(|o| o.auto_complete_at.filter(|d| *d <= now).map(|d| (d, o.id)))
            .collect();
        due.sort();
        Ok(due.into_iter().take(limit.max(0) as usize).map(|(_, id)| id).collect())
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn insert_review(&self, review: &Review) -> StoreResult<ReviewInsert> {
        let mut state = self.state.write().map_err(poison_err)?;
        let duplicate = state
            .reviews
            .iter()
            .any(|r| r.offer_id == review.offer_id && r.reviewer_id == review.reviewer_id);
        if duplicate {
            return Ok(ReviewInsert::Duplicate);
        }

        state.reviews.push(review.clone());
        let totals = state.totals.entry(review.reviewee_id).or_default();
        totals.rating_sum += i64::from(review.rating);
        totals.total_reviews += 1;

        Ok(ReviewInsert::Inserted {
            review: review.clone(),
            summary: RatingSummary::from_totals(
                review.reviewee_id,
                totals.rating_sum,
                totals.total_reviews,
            ),
        })
    }

    async fn reviews_for(
        &self,
        reviewee_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Review>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut reviews: Vec<Review> = state
            .reviews
            .iter()
            .filter(|r| r.reviewee_id == reviewee_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn rating_summary(&self, user_id: Uuid) -> StoreResult<RatingSummary> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .totals
            .get(&user_id)
            .map(|t| RatingSummary::from_totals(user_id, t.rating_sum, t.total_reviews))
            .unwrap_or_else(|| RatingSummary::empty(user_id)))
    }
}
