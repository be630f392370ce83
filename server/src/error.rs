//! Error types for the offer core

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ActorRole, ErrorDetails, OfferStatus};

/// Storage layer fault
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Caller-facing offer and review errors
#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("Offer not found")]
    NotFound,
    #[error("Cannot move offer from {from} to {to} (actor: {role})")]
    InvalidTransition {
        from: OfferStatus,
        to: OfferStatus,
        role: ActorRole,
    },
    #[error("A {role} may not move offer from {from} to {to}")]
    UnauthorizedActor {
        from: OfferStatus,
        to: OfferStatus,
        role: ActorRole,
    },
    #[error("Offer {offer_id} is no longer {expected}; re-fetch and retry")]
    StaleState {
        offer_id: Uuid,
        expected: OfferStatus,
    },
    #[error("A reason is required to cancel an offer")]
    ReasonRequired,
    #[error("Cannot move offer to {to} before its deadline ({deadline:?})")]
    DeadlineNotReached {
        to: OfferStatus,
        deadline: Option<DateTime<Utc>>,
    },
    #[error("Invalid offer data: {0}")]
    Validation(String),
    #[error("Offer is {status}, reviews require a completed offer")]
    OfferNotCompleted { status: OfferStatus },
    #[error("User is not a party to this offer")]
    NotAParty,
    #[error("A review for this offer was already submitted")]
    DuplicateReview,
    #[error("Rating {0} is outside 1-5")]
    InvalidRating(i32),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl OfferError {
    /// Stable machine-readable tag
    pub fn kind(&self) -> &'static str {
        match self {
            OfferError::NotFound => "not_found",
            OfferError::InvalidTransition { .. } => "invalid_transition",
            OfferError::UnauthorizedActor { .. } => "unauthorized_actor",
            OfferError::StaleState { .. } => "stale_state",
            OfferError::ReasonRequired => "reason_required",
            OfferError::DeadlineNotReached { .. } => "deadline_not_reached",
            OfferError::Validation(_) => "validation",
            OfferError::OfferNotCompleted { .. } => "offer_not_completed",
            OfferError::NotAParty => "not_a_party",
            OfferError::DuplicateReview => "duplicate_review",
            OfferError::InvalidRating(_) => "invalid_rating",
            OfferError::Storage(_) => "internal",
        }
    }

    /// Only an optimistic-concurrency loss is worth re-fetching and reissuing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OfferError::StaleState { .. })
    }

    pub fn details(&self) -> ErrorDetails {
        let (current_status, requested_status, actor_role) = match self {
            OfferError::InvalidTransition { from, to, role }
            | OfferError::UnauthorizedActor { from, to, role } => {
                (Some(*from), Some(*to), Some(*role))
            }
            OfferError::StaleState { expected, .. } => (Some(*expected), None, None),
            OfferError::DeadlineNotReached { to, .. } => (None, Some(*to), None),
            OfferError::OfferNotCompleted { status } => (Some(*status), None, None),
            _ => (None, None, None),
        };
        ErrorDetails {
            kind: self.kind().to_string(),
            retryable: self.is_retryable(),
            current_status,
            requested_status,
            actor_role,
        }
    }
}

impl From<validator::ValidationErrors> for OfferError {
    fn from(errors: validator::ValidationErrors) -> Self {
        OfferError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stale_state_is_retryable() {
        let stale = OfferError::StaleState {
            offer_id: Uuid::new_v4(),
            expected: OfferStatus::Pending,
        };
        assert!(stale.is_retryable());
        assert!(!OfferError::DuplicateReview.is_retryable());
        assert!(!OfferError::Storage(StoreError::Poisoned).is_retryable());
    }

    #[test]
    fn transition_errors_carry_state_details() {
        let err = OfferError::InvalidTransition {
            from: OfferStatus::Pending,
            to: OfferStatus::Shipped,
            role: ActorRole::Buyer,
        };
        let details = err.details();
        assert_eq!(details.kind, "invalid_transition");
        assert_eq!(details.current_status, Some(OfferStatus::Pending));
        assert_eq!(details.requested_status, Some(OfferStatus::Shipped));
        assert_eq!(details.actor_role, Some(ActorRole::Buyer));
    }
}
