//! Offer records and the closed vocabularies they are built from.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Offer lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "offer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    ToShip,
    Shipped,
    ReadyToPickup,
    ToReceive,
    Completed,
    Cancelled,
    Expired,
}

impl OfferStatus {
    pub const ALL: [OfferStatus; 10] = [
        OfferStatus::Pending,
        OfferStatus::Accepted,
        OfferStatus::Rejected,
        OfferStatus::ToShip,
        OfferStatus::Shipped,
        OfferStatus::ReadyToPickup,
        OfferStatus::ToReceive,
        OfferStatus::Completed,
        OfferStatus::Cancelled,
        OfferStatus::Expired,
    ];

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OfferStatus::Completed
                | OfferStatus::Rejected
                | OfferStatus::Cancelled
                | OfferStatus::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::ToShip => "to_ship",
            OfferStatus::Shipped => "shipped",
            OfferStatus::ReadyToPickup => "ready_to_pickup",
            OfferStatus::ToReceive => "to_receive",
            OfferStatus::Completed => "completed",
            OfferStatus::Cancelled => "cancelled",
            OfferStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is acting on an offer
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(Uuid),
    /// The scheduler or a trusted internal collaborator
    System,
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::System => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}

/// The part an actor plays with respect to one particular offer
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Buyer,
    Seller,
    System,
    /// Authenticated, but neither buyer nor seller
    Outsider,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActorRole::Buyer => "buyer",
            ActorRole::Seller => "seller",
            ActorRole::System => "system",
            ActorRole::Outsider => "outsider",
        };
        f.write_str(name)
    }
}

/// Payment methods (recorded as metadata only)
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    MobilePayment,
    CreditCard,
}

/// Fulfillment options the buyer is willing to accept
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOption {
    Pickup,
    SellerDelivery,
    Courier,
}

/// When payment is expected relative to delivery
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerm {
    Upfront,
    OnDelivery,
    Installment,
}

/// Structured delivery address
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

/// Offer model
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Offer {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub unit: String,
    pub message: Option<String>,
    pub delivery_location: Option<String>,
    pub delivery_address: Option<DeliveryAddress>,
    pub delivery_options: BTreeSet<DeliveryOption>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_terms: BTreeSet<PaymentTerm>,
    pub status: OfferStatus,
    pub valid_until: Option<DateTime<Utc>>,
    pub auto_complete_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    /// Resolve the role `actor` plays on this offer.
    pub fn role_of(&self, actor: Actor) -> ActorRole {
        match actor {
            Actor::System => ActorRole::System,
            Actor::User(id) if id == self.buyer_id => ActorRole::Buyer,
            Actor::User(id) if id == self.seller_id => ActorRole::Seller,
            Actor::User(_) => ActorRole::Outsider,
        }
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        user_id == self.buyer_id || user_id == self.seller_id
    }

    /// The other party of the offer, if `user_id` is one of them.
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.buyer_id {
            Some(self.seller_id)
        } else if user_id == self.seller_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }
}

/// Largest precision the `offers` columns hold (`NUMERIC(18, _)`).
const AMOUNT_PRECISION: u32 = 18;
pub const PRICE_SCALE: u32 = 2;
pub const QUANTITY_SCALE: u32 = 3;

/// Positive and representable in `NUMERIC(18, scale)` without rounding.
fn storable_amount(value: &Decimal, scale: u32) -> Result<(), ValidationError> {
    if !value.is_sign_positive() || value.is_zero() {
        return Err(ValidationError::new("must_be_positive"));
    }
    if value.normalize().scale() > scale {
        return Err(ValidationError::new("too_many_decimal_places"));
    }
    let limit = Decimal::from(10_i64.pow(AMOUNT_PRECISION - scale));
    if value.trunc() >= limit {
        return Err(ValidationError::new("too_large"));
    }
    Ok(())
}

fn price_amount(value: &Decimal) -> Result<(), ValidationError> {
    storable_amount(value, PRICE_SCALE)
}

fn quantity_amount(value: &Decimal) -> Result<(), ValidationError> {
    storable_amount(value, QUANTITY_SCALE)
}

/// Everything needed to open a new offer
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewOffer {
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Uuid,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[validate(custom = "price_amount")]
    pub price: Decimal,
    #[validate(custom = "quantity_amount")]
    pub quantity: Decimal,
    #[validate(length(min = 1, max = 32))]
    pub unit: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub message: Option<String>,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub delivery_location: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
    #[serde(default)]
    pub delivery_options: BTreeSet<DeliveryOption>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_terms: BTreeSet<PaymentTerm>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewOffer {
    /// Minimal offer with empty terms; the remaining fields can be set directly.
    pub fn new(
        buyer_id: Uuid,
        seller_id: Uuid,
        product_id: Uuid,
        price: Decimal,
        quantity: Decimal,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            buyer_id,
            seller_id,
            product_id,
            conversation_id: None,
            price,
            quantity,
            unit: unit.into(),
            message: None,
            delivery_location: None,
            delivery_address: None,
            delivery_options: BTreeSet::new(),
            payment_method: None,
            payment_terms: BTreeSet::new(),
            valid_until: None,
        }
    }
}

/// Create offer request body; the buyer is the authenticated caller
#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub seller_id: Uuid,
    pub product_id: Uuid,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub unit: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub delivery_location: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
    #[serde(default)]
    pub delivery_options: BTreeSet<DeliveryOption>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_terms: BTreeSet<PaymentTerm>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl CreateOfferRequest {
    pub fn into_new_offer(self, buyer_id: Uuid) -> NewOffer {
        NewOffer {
            buyer_id,
            seller_id: self.seller_id,
            product_id: self.product_id,
            conversation_id: self.conversation_id,
            price: self.price,
            quantity: self.quantity,
            unit: self.unit,
            message: self.message,
            delivery_location: self.delivery_location,
            delivery_address: self.delivery_address,
            delivery_options: self.delivery_options,
            payment_method: self.payment_method,
            payment_terms: self.payment_terms,
            valid_until: self.valid_until,
        }
    }
}

/// Transition request body
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: OfferStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Which side of the offers a party wants to see
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Buyer,
    Seller,
    #[default]
    Any,
}

impl PartyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyRole::Buyer => "buyer",
            PartyRole::Seller => "seller",
            PartyRole::Any => "any",
        }
    }
}

/// Offer listing filter
#[derive(Debug, Clone)]
pub struct OfferFilter {
    pub party_id: Uuid,
    pub role: PartyRole,
    pub status: Option<OfferStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl OfferFilter {
    pub fn matches(&self, offer: &Offer) -> bool {
        let party = match self.role {
            PartyRole::Buyer => offer.buyer_id == self.party_id,
            PartyRole::Seller => offer.seller_id == self.party_id,
            PartyRole::Any => offer.is_party(self.party_id),
        };
        party && self.status.map_or(true, |status| offer.status == status)
    }
}

/// Query parameters for listing offers
#[derive(Debug, Deserialize)]
pub struct ListOffersQuery {
    #[serde(default)]
    pub role: PartyRole,
    pub status: Option<OfferStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
