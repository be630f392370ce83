//! Review gate: one review per reviewer per completed offer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::OfferError;
use crate::models::{OfferStatus, RatingSummary, Review, ReviewInsert};
use crate::store::MarketStore;

const MAX_COMMENT_CHARS: usize = 2000;

/// Review service
pub struct ReviewService {
    store: Arc<dyn MarketStore>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    /// Record `reviewer_id`'s review of the other party on `offer_id`.
    ///
    /// # Errors
    /// `InvalidRating`, `NotFound`, `NotAParty`, `OfferNotCompleted` and
    /// `DuplicateReview`, checked in that order.
    pub async fn submit_review(
        &self,
        offer_id: Uuid,
        reviewer_id: Uuid,
        rating: i32,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Review, OfferError> {
        if !(1..=5).contains(&rating) {
            return Err(OfferError::InvalidRating(rating));
        }
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
        {
            return Err(OfferError::Validation(format!(
                "comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }

        let offer = self
            .store
            .get_offer(offer_id)
            .await?
            .ok_or(OfferError::NotFound)?;
        let reviewee_id = offer
            .counterpart_of(reviewer_id)
            .ok_or(OfferError::NotAParty)?;
        if offer.status != OfferStatus::Completed {
            return Err(OfferError::OfferNotCompleted {
                status: offer.status,
            });
        }

        let review = Review {
            id: Uuid::new_v4(),
            offer_id,
            reviewer_id,
            reviewee_id,
            rating,
            comment,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_review(&review).await? {
            ReviewInsert::Inserted { review, summary } => {
                tracing::info!(
                    offer_id = %offer_id,
                    reviewer_id = %reviewer_id,
                    reviewee_id = %reviewee_id,
                    rating,
                    total_reviews = summary.total_reviews,
                    "Review submitted"
                );
                Ok(review)
            }
            ReviewInsert::Duplicate => Err(OfferError::DuplicateReview),
        }
    }

    /// Reviews received by `user_id`, newest first.
    pub async fn list_reviews(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, OfferError> {
        Ok(self.store.reviews_for(user_id, limit, offset).await?)
    }

    pub async fn get_aggregate_rating(&self, user_id: Uuid) -> Result<RatingSummary, OfferError> {
        Ok(self.store.rating_summary(user_id).await?)
    }
}
