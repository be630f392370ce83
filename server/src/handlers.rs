//! API handlers for the offer core

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::OfferError;
use crate::models::{
    Actor, ApiResponse, CreateOfferRequest, ListOffersQuery, Offer, OfferFilter, OfferStatus,
    PaginationParams, RatingSummary, Review, SubmitReviewRequest, TransitionRequest,
};

/// Header carrying the caller's user id, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "X-User-Id";
pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// Handler error rendered as an `ApiResponse` envelope
#[derive(Debug)]
pub enum ApiError {
    Offer(OfferError),
    Unauthenticated(&'static str),
    WebhookUnavailable,
}

impl From<OfferError> for ApiError {
    fn from(err: OfferError) -> Self {
        ApiError::Offer(err)
    }
}

fn status_for(err: &OfferError) -> StatusCode {
    match err {
        OfferError::NotFound => StatusCode::NOT_FOUND,
        OfferError::UnauthorizedActor { .. } | OfferError::NotAParty => StatusCode::FORBIDDEN,
        OfferError::InvalidTransition { .. }
        | OfferError::StaleState { .. }
        | OfferError::OfferNotCompleted { .. }
        | OfferError::DuplicateReview
        | OfferError::DeadlineNotReached { .. } => StatusCode::CONFLICT,
        OfferError::Validation(_) | OfferError::ReasonRequired | OfferError::InvalidRating(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        OfferError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            ApiError::Offer(OfferError::Storage(e)) => {
                tracing::error!(error = %e, "Storage failure while handling request");
                let err = OfferError::Storage(e);
                (status_for(&err), "internal error".to_string(), Some(err.details()))
            }
            ApiError::Offer(err) => (status_for(&err), err.to_string(), Some(err.details())),
            ApiError::Unauthenticated(message) => {
                (StatusCode::UNAUTHORIZED, message.to_string(), None)
            }
            ApiError::WebhookUnavailable => {
                tracing::error!("Webhook secret not configured - rejecting request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Webhook endpoint is not configured".to_string(),
                    None,
                )
            }
        };

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
            details,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub(crate) fn caller_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::Unauthenticated("Missing X-User-Id header"))?;
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::Unauthenticated("Invalid X-User-Id header"))
}

pub async fn root() -> &'static str {
    "Marketplace Offer API"
}

pub async fn health_check() -> &'static str {
    "OK"
}

// ===== Offer Handlers =====

/// Open a new offer; the caller is the buyer
pub async fn create_offer(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Offer>>), ApiError> {
    let buyer_id = caller_id(&headers)?;
    let offer = app_state
        .offer_service
        .create_offer(request.into_new_offer(buyer_id), Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(offer))))
}

pub async fn get_offer(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(offer_id): Path<Uuid>,
) -> ApiResult<Offer> {
    let viewer_id = caller_id(&headers)?;
    let offer = app_state.offer_service.get_offer(offer_id, viewer_id).await?;
    Ok(Json(ApiResponse::ok(offer)))
}

/// List the caller's offers with role/status filtering and pagination
pub async fn list_offers(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListOffersQuery>,
) -> ApiResult<Vec<Offer>> {
    let party_id = caller_id(&headers)?;
    let (limit, offset) = PaginationParams {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve();

    let filter = OfferFilter {
        party_id,
        role: query.role,
        status: query.status,
        limit,
        offset,
    };
    let offers = app_state.offer_service.list_offers(&filter).await?;
    Ok(Json(ApiResponse::ok(offers)))
}

/// Single entry point for user-driven status changes
pub async fn transition_offer(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(offer_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<Offer> {
    let actor = Actor::User(caller_id(&headers)?);
    let offer = app_state
        .offer_service
        .transition(
            offer_id,
            actor,
            request.status,
            request.reason.as_deref(),
            Utc::now(),
        )
        .await?;
    Ok(Json(ApiResponse::ok(offer)))
}

/// Logistics webhook payload
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub offer_id: Uuid,
    pub status: OfferStatus,
}

/// Webhook for trusted collaborators acting as the system
pub async fn offer_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Offer> {
    match &app_state.webhook_secret {
        Some(secret) if !secret.is_empty() => {
            let auth_header = headers
                .get(WEBHOOK_SECRET_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default();

            if !bool::from(auth_header.as_bytes().ct_eq(secret.as_bytes())) {
                return Err(ApiError::Unauthenticated("Unauthorized webhook request"));
            }
        }
        // Fail closed without a configured secret
        _ => return Err(ApiError::WebhookUnavailable),
    }

    let offer = app_state
        .offer_service
        .transition(payload.offer_id, Actor::System, payload.status, None, Utc::now())
        .await?;
    Ok(Json(ApiResponse::ok(offer)))
}

// ===== Review Handlers =====

pub async fn submit_review(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(offer_id): Path<Uuid>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Review>>), ApiError> {
    let reviewer_id = caller_id(&headers)?;
    let review = app_state
        .review_service
        .submit_review(offer_id, reviewer_id, request.rating, request.comment, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(review))))
}

pub async fn list_user_reviews(
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Vec<Review>> {
    let (limit, offset) = page.resolve();
    let reviews = app_state
        .review_service
        .list_reviews(user_id, limit, offset)
        .await?;
    Ok(Json(ApiResponse::ok(reviews)))
}

pub async fn get_user_rating(
    State(app_state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<RatingSummary> {
    let summary = app_state.review_service.get_aggregate_rating(user_id).await?;
    Ok(Json(ApiResponse::ok(summary)))
}
