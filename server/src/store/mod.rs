//! Persistence seams for offers and reviews.
//!
//! [`OfferStore::apply_transition`] is the single serialization point for
//! status changes: it writes only while the row still carries the expected
//! pre-state. Two stores implement the contract:
//!
//! - [`postgres::PgStore`] for production
//! - [`memory::InMemoryStore`] for tests and database-less local runs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{Offer, OfferFilter, OfferStatus, RatingSummary, Review, ReviewInsert};
use crate::transition::OfferUpdate;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn insert_offer(&self, offer: &Offer) -> StoreResult<()>;

    async fn get_offer(&self, id: Uuid) -> StoreResult<Option<Offer>>;

    async fn list_offers(&self, filter: &OfferFilter) -> StoreResult<Vec<Offer>>;

    /// Apply `update` only if the offer is still in `expected`.
    ///
    /// Returns `None` when the offer is missing or its status has moved on.
    async fn apply_transition(
        &self,
        id: Uuid,
        expected: OfferStatus,
        update: &OfferUpdate,
    ) -> StoreResult<Option<Offer>>;

    /// Pending offers whose `valid_until` is before `now`, oldest deadline first.
    async fn due_expirations(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>>;

    /// `to_receive` offers whose `auto_complete_at` is at or before `now`.
    async fn due_auto_completions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert the review and fold its rating into the reviewee's summary in
    /// one atomic step, or report that the (offer, reviewer) pair exists.
    async fn insert_review(&self, review: &Review) -> StoreResult<ReviewInsert>;

    async fn reviews_for(&self, reviewee_id: Uuid, limit: i64, offset: i64)
        -> StoreResult<Vec<Review>>;

    async fn rating_summary(&self, user_id: Uuid) -> StoreResult<RatingSummary>;
}

pub trait MarketStore: OfferStore + ReviewStore {}

impl<T: OfferStore + ReviewStore> MarketStore for T {}
