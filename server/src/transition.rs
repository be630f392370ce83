//! Offer status transition rules.
//!
//! The edge table is [`rule`]: a function over every `(from, to)` pair that
//! names which roles may take the edge. Anything it does not list is an
//! `InvalidTransition`. [`plan`] turns a permitted request into the
//! [`OfferUpdate`] the store applies conditionally on the pre-state.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::OfferError;
use crate::models::{Actor, ActorRole, Offer, OfferStatus};

use ActorRole::{Buyer, Seller, System};

/// Length of the buyer confirmation window once goods reach the buyer
pub const DEFAULT_AUTO_COMPLETE_DAYS: i64 = 7;

/// One row of the edge table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub actors: &'static [ActorRole],
    pub requires_reason: bool,
}

impl Rule {
    const fn by(actors: &'static [ActorRole]) -> Self {
        Self {
            actors,
            requires_reason: false,
        }
    }

    const fn with_reason(actors: &'static [ActorRole]) -> Self {
        Self {
            actors,
            requires_reason: true,
        }
    }

    pub fn allows(&self, role: ActorRole) -> bool {
        self.actors.contains(&role)
    }
}

/// The edge table. Terminal statuses have no outgoing edges.
pub fn rule(from: OfferStatus, to: OfferStatus) -> Option<Rule> {
    use OfferStatus::*;

    match from {
        Pending => match to {
            Accepted | Rejected => Some(Rule::by(&[Seller])),
            Cancelled => Some(Rule::with_reason(&[Buyer])),
            Expired => Some(Rule::by(&[System])),
            _ => None,
        },
        Accepted => match to {
            ToShip => Some(Rule::by(&[Seller])),
            Cancelled => Some(Rule::with_reason(&[Buyer, Seller])),
            _ => None,
        },
        ToShip => match to {
            Shipped | ReadyToPickup => Some(Rule::by(&[Seller])),
            Cancelled => Some(Rule::with_reason(&[Buyer, Seller])),
            _ => None,
        },
        Shipped => match to {
            ToReceive => Some(Rule::by(&[Seller, System])),
            Cancelled => Some(Rule::with_reason(&[Buyer, Seller])),
            _ => None,
        },
        ReadyToPickup => match to {
            ToReceive => Some(Rule::by(&[Buyer, System])),
            Cancelled => Some(Rule::with_reason(&[Buyer, Seller])),
            _ => None,
        },
        ToReceive => match to {
            Completed => Some(Rule::by(&[Buyer, System])),
            _ => None,
        },
        Completed | Rejected | Cancelled | Expired => None,
    }
}

/// Cancellation bookkeeping persisted alongside the status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub by: Uuid,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// The row mutation produced by a permitted transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferUpdate {
    pub status: OfferStatus,
    pub updated_at: DateTime<Utc>,
    /// Set on entry to `to_receive`, cleared on every other transition.
    pub auto_complete_at: Option<DateTime<Utc>>,
    pub cancellation: Option<Cancellation>,
}

impl OfferUpdate {
    /// Apply this update to an in-memory copy of the offer.
    pub fn apply_to(&self, offer: &mut Offer) {
        offer.status = self.status;
        offer.updated_at = self.updated_at;
        offer.auto_complete_at = self.auto_complete_at;
        if let Some(cancellation) = &self.cancellation {
            offer.cancelled_by = Some(cancellation.by);
            offer.cancelled_reason = Some(cancellation.reason.clone());
            offer.cancelled_at = Some(cancellation.at);
        }
    }
}

/// Validate `actor` moving `offer` to `to` at `now`, producing the update to apply.
pub fn plan(
    offer: &Offer,
    actor: Actor,
    to: OfferStatus,
    reason: Option<&str>,
    now: DateTime<Utc>,
    auto_complete_after: Duration,
) -> Result<OfferUpdate, OfferError> {
    let from = offer.status;
    let role = offer.role_of(actor);

    let rule = rule(from, to).ok_or(OfferError::InvalidTransition { from, to, role })?;
    if !rule.allows(role) {
        return Err(OfferError::UnauthorizedActor { from, to, role });
    }

    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    if rule.requires_reason && reason.is_none() {
        return Err(OfferError::ReasonRequired);
    }

    check_deadline(offer, role, to, now)?;

    let cancellation = match (to, actor.user_id(), reason) {
        (OfferStatus::Cancelled, Some(by), Some(reason)) => Some(Cancellation {
            by,
            reason: reason.to_string(),
            at: now,
        }),
        (OfferStatus::Cancelled, _, _) => {
            return Err(OfferError::UnauthorizedActor { from, to, role })
        }
        _ => None,
    };

    let auto_complete_at = (to == OfferStatus::ToReceive).then(|| now + auto_complete_after);

    Ok(OfferUpdate {
        status: to,
        updated_at: now,
        auto_complete_at,
        cancellation,
    })
}

/// System-driven timeouts only fire once their deadline has passed.
fn check_deadline(
    offer: &Offer,
    role: ActorRole,
    to: OfferStatus,
    now: DateTime<Utc>,
) -> Result<(), OfferError> {
    let (deadline, due) = match (offer.status, to, role) {
        (OfferStatus::Pending, OfferStatus::Expired, _) => {
            (offer.valid_until, offer.valid_until.is_some_and(|d| now > d))
        }
        (OfferStatus::ToReceive, OfferStatus::Completed, ActorRole::System) => (
            offer.auto_complete_at,
            offer.auto_complete_at.is_some_and(|d| now >= d),
        ),
        _ => return Ok(()),
    };

    if due {
        Ok(())
    } else {
        Err(OfferError::DeadlineNotReached { to, deadline })
    }
}
