//! Shared fixtures for offer-core integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::Barrier;
use uuid::Uuid;

use marketplace_server::error::StoreResult;
use marketplace_server::events::EventBus;
use marketplace_server::models::{
    Actor, NewOffer, Offer, OfferFilter, OfferStatus, RatingSummary, Review, ReviewInsert,
};
use marketplace_server::offers::OfferService;
use marketplace_server::reviews::ReviewService;
use marketplace_server::store::{InMemoryStore, MarketStore, OfferStore, ReviewStore};
use marketplace_server::transition::OfferUpdate;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

pub fn minutes(n: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(n)
}

pub struct Harness {
    pub store: Arc<dyn MarketStore>,
    pub bus: EventBus,
    pub offers: Arc<OfferService>,
    pub reviews: Arc<ReviewService>,
    pub buyer: Uuid,
    pub seller: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn MarketStore>) -> Self {
        let bus = EventBus::new(64);
        Self {
            offers: Arc::new(OfferService::new(store.clone(), bus.clone())),
            reviews: Arc::new(ReviewService::new(store.clone())),
            store,
            bus,
            buyer: Uuid::new_v4(),
            seller: Uuid::new_v4(),
        }
    }

    pub fn new_offer(&self) -> NewOffer {
        NewOffer::new(
            self.buyer,
            self.seller,
            Uuid::new_v4(),
            Decimal::from(50_000),
            Decimal::from(10),
            "kg",
        )
    }

    pub async fn pending_offer(&self) -> Offer {
        self.offers.create_offer(self.new_offer(), t0()).await.unwrap()
    }

    pub async fn step(&self, offer: &Offer, actor: Actor, to: OfferStatus, at: DateTime<Utc>) -> Offer {
        self.offers
            .transition(offer.id, actor, to, None, at)
            .await
            .unwrap_or_else(|e| panic!("{} -> {to} failed: {e}", offer.status))
    }

    /// Drive a fresh offer along the delivery path up to `target`.
    pub async fn offer_at(&self, target: OfferStatus) -> Offer {
        let seller = Actor::User(self.seller);
        let buyer = Actor::User(self.buyer);
        let path = [
            (OfferStatus::Accepted, seller),
            (OfferStatus::ToShip, seller),
            (OfferStatus::Shipped, seller),
            (OfferStatus::ToReceive, seller),
            (OfferStatus::Completed, buyer),
        ];

        let mut offer = self.pending_offer().await;
        for (i, (status, actor)) in path.into_iter().enumerate() {
            if offer.status == target {
                break;
            }
            offer = self.step(&offer, actor, status, minutes(i as i64 + 1)).await;
        }
        assert_eq!(offer.status, target, "target not on the delivery path");
        offer
    }
}

/// Store wrapper that can hold the first two reads at a barrier and can
/// report extra offers as due for a sweep.
pub struct ScriptedStore {
    pub inner: InMemoryStore,
    read_barrier: Option<Barrier>,
    reads: AtomicUsize,
    pub extra_due: Vec<Uuid>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            read_barrier: None,
            reads: AtomicUsize::new(0),
            extra_due: Vec::new(),
        }
    }

    /// The first two `get_offer` calls wait for each other before returning.
    pub fn with_read_barrier(mut self) -> Self {
        self.read_barrier = Some(Barrier::new(2));
        self
    }

    pub fn with_extra_due(mut self, ids: Vec<Uuid>) -> Self {
        self.extra_due = ids;
        self
    }
}

#[async_trait]
impl OfferStore for ScriptedStore {
    async fn insert_offer(&self, offer: &Offer) -> StoreResult<()> {
        self.inner.insert_offer(offer).await
    }

    async fn get_offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        let offer = self.inner.get_offer(id).await?;
        if let Some(barrier) = &self.read_barrier {
            if self.reads.fetch_add(1, Ordering::SeqCst) < 2 {
                barrier.wait().await;
            }
        }
        Ok(offer)
    }

    async fn list_offers(&self, filter: &OfferFilter) -> StoreResult<Vec<Offer>> {
        self.inner.list_offers(filter).await
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        expected: OfferStatus,
        update: &OfferUpdate,
    ) -> StoreResult<Option<Offer>> {
        self.inner.apply_transition(id, expected, update).await
    }

    async fn due_expirations(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>> {
        self.inner.due_expirations(now, limit).await
    }

    async fn due_auto_completions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        let mut due = self.extra_due.clone();
        due.extend(self.inner.due_auto_completions(now, limit).await?);
        Ok(due)
    }
}

#[async_trait]
impl ReviewStore for ScriptedStore {
    async fn insert_review(&self, review: &Review) -> StoreResult<ReviewInsert> {
        self.inner.insert_review(review).await
    }

    async fn reviews_for(
        &self,
        reviewee_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Review>> {
        self.inner.reviews_for(reviewee_id, limit, offset).await
    }

    async fn rating_summary(&self, user_id: Uuid) -> StoreResult<RatingSummary> {
        self.inner.rating_summary(user_id).await
    }
}
