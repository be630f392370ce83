//! Post-completion reviews and the per-user rating aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Review {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized rating aggregate for one user
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub user_id: Uuid,
    pub rating: f64,
    pub total_reviews: i64,
}

impl RatingSummary {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            rating: 0.0,
            total_reviews: 0,
        }
    }

    /// Mean rating from the stored running sum.
    pub fn from_totals(user_id: Uuid, rating_sum: i64, total_reviews: i64) -> Self {
        let rating = if total_reviews > 0 {
            rating_sum as f64 / total_reviews as f64
        } else {
            0.0
        };
        Self {
            user_id,
            rating,
            total_reviews,
        }
    }
}

/// Outcome of an attempted review insert
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewInsert {
    Inserted {
        review: Review,
        summary: RatingSummary,
    },
    Duplicate,
}

/// Submit review request body; the reviewer is the authenticated caller
#[derive(Debug, Deserialize)]
pub struct SubmitReviewRequest {
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
}
