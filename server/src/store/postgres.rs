//! Postgres store backed by sqlx.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{OfferStore, ReviewStore};
use crate::error::StoreResult;
use crate::models::{
    DeliveryAddress, DeliveryOption, Offer, OfferFilter, OfferStatus, PaymentMethod,
    PaymentTerm, RatingSummary, Review, ReviewInsert,
};
use crate::transition::OfferUpdate;

/// Row shape of the `offers` table
#[derive(Debug, sqlx::FromRow)]
struct OfferRow {
    id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    product_id: Uuid,
    conversation_id: Option<Uuid>,
    price: Decimal,
    quantity: Decimal,
    unit: String,
    message: Option<String>,
    delivery_location: Option<String>,
    delivery_address: Option<Json<DeliveryAddress>>,
    delivery_options: Json<BTreeSet<DeliveryOption>>,
    payment_method: Option<PaymentMethod>,
    payment_terms: Json<BTreeSet<PaymentTerm>>,
    status: OfferStatus,
    valid_until: Option<DateTime<Utc>>,
    auto_complete_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
    cancelled_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OfferRow> for Offer {
    fn from(row: OfferRow) -> Self {
        Self {
            id: row.id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            product_id: row.product_id,
            conversation_id: row.conversation_id,
            price: row.price,
            quantity: row.quantity,
            unit: row.unit,
            message: row.message,
            delivery_location: row.delivery_location,
            delivery_address: row.delivery_address.map(|Json(address)| address),
            delivery_options: row.delivery_options.0,
            payment_method: row.payment_method,
            payment_terms: row.payment_terms.0,
            status: row.status,
            valid_until: row.valid_until,
            auto_complete_at: row.auto_complete_at,
            cancelled_by: row.cancelled_by,
            cancelled_reason: row.cancelled_reason,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Postgres-backed offer and review store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OfferStore for PgStore {
    async fn insert_offer(&self, offer: &Offer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO offers (
                id, buyer_id, seller_id, product_id, conversation_id,
                price, quantity, unit, message, delivery_location,
                delivery_address, delivery_options, payment_method, payment_terms,
                status, valid_until, auto_complete_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19)
            "#,
        )
        .bind(offer.id)
        .bind(offer.buyer_id)
        .bind(offer.seller_id)
        .bind(offer.product_id)
        .bind(offer.conversation_id)
        .bind(offer.price)
        .bind(offer.quantity)
        .bind(&offer.unit)
        .bind(&offer.message)
        .bind(&offer.delivery_location)
        .bind(offer.delivery_address.as_ref().map(Json))
        .bind(Json(&offer.delivery_options))
        .bind(offer.payment_method)
        .bind(Json(&offer.payment_terms))
        .bind(offer.status)
        .bind(offer.valid_until)
        .bind(offer.auto_complete_at)
        .bind(offer.created_at)
        .bind(offer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_offer(&self, id: Uuid) -> StoreResult<Option<Offer>> {
        let row = sqlx::query_as::<_, OfferRow>("SELECT * FROM offers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Offer::from))
    }

    async fn list_offers(&self, filter: &OfferFilter) -> StoreResult<Vec<Offer>> {
        let rows = sqlx::query_as::<_, OfferRow>(
            r#"
            SELECT * FROM offers
            WHERE (
                ($2 = 'buyer' AND buyer_id = $1)
                OR ($2 = 'seller' AND seller_id = $1)
                OR ($2 = 'any' AND (buyer_id = $1 OR seller_id = $1))
            )
            AND ($3::offer_status IS NULL OR status = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.party_id)
        .bind(filter.role.as_str())
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Offer::from).collect())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        expected: OfferStatus,
        update: &OfferUpdate,
    ) -> StoreResult<Option<Offer>> {
        let cancellation = update.cancellation.as_ref();

        let row = sqlx::query_as::<_, OfferRow>(
            r#"
            UPDATE offers
            SET status = $3,
                updated_at = $4,
                auto_complete_at = $5,
                cancelled_by = COALESCE($6, cancelled_by),
                cancelled_reason = COALESCE($7, cancelled_reason),
                cancelled_at = COALESCE($8, cancelled_at)
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(update.status)
        .bind(update.updated_at)
        .bind(update.auto_complete_at)
        .bind(cancellation.map(|c| c.by))
        .bind(cancellation.map(|c| c.reason.as_str()))
        .bind(cancellation.map(|c| c.at))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Offer::from))
    }

    async fn due_expirations(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM offers
            WHERE status = 'pending' AND valid_until < $1
            ORDER BY valid_until
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn due_auto_completions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM offers
            WHERE status = 'to_receive' AND auto_complete_at <= $1
            ORDER BY auto_complete_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn insert_review(&self, review: &Review) -> StoreResult<ReviewInsert> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO offer_reviews (
                id, offer_id, reviewer_id, reviewee_id, rating, comment, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (offer_id, reviewer_id) DO NOTHING
            RETURNING id, offer_id, reviewer_id, reviewee_id, rating, comment,
                      created_at, updated_at
            "#,
        )
        .bind(review.id)
        .bind(review.offer_id)
        .bind(review.reviewer_id)
        .bind(review.reviewee_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .bind(review.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(review) = inserted else {
            tx.rollback().await?;
            return Ok(ReviewInsert::Duplicate);
        };

        // Increment in SQL so concurrent submissions never overwrite each other.
        let (rating_sum, total_reviews): (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO user_rating_summaries (user_id, rating_sum, total_reviews, rating, updated_at)
            VALUES ($1, $2, 1, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET rating_sum = user_rating_summaries.rating_sum + EXCLUDED.rating_sum,
                total_reviews = user_rating_summaries.total_reviews + 1,
                rating = (user_rating_summaries.rating_sum + EXCLUDED.rating_sum)::float8
                         / (user_rating_summaries.total_reviews + 1),
                updated_at = EXCLUDED.updated_at
            RETURNING rating_sum, total_reviews
            "#,
        )
        .bind(review.reviewee_id)
        .bind(i64::from(review.rating))
        .bind(f64::from(review.rating))
        .bind(review.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let summary = RatingSummary::from_totals(review.reviewee_id, rating_sum, total_reviews);
        Ok(ReviewInsert::Inserted { review, summary })
    }

    async fn reviews_for(
        &self,
        reviewee_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT * FROM offer_reviews
            WHERE reviewee_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(reviewee_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(reviews)
    }

    async fn rating_summary(&self, user_id: Uuid) -> StoreResult<RatingSummary> {
        let totals: Option<(i64, i64)> = sqlx::query_as(
            "SELECT rating_sum, total_reviews FROM user_rating_summaries WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(totals
            .map(|(sum, count)| RatingSummary::from_totals(user_id, sum, count))
            .unwrap_or_else(|| RatingSummary::empty(user_id)))
    }
}
