mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::Harness;
use marketplace_server::app_state::AppState;
use marketplace_server::models::{ApiResponse, Offer, OfferStatus, RatingSummary, Review};
use marketplace_server::routes;

const SECRET: &str = "logistics-secret";

fn app(h: &Harness) -> Router {
    let state = AppState::new(
        h.offers.clone(),
        h.reviews.clone(),
        h.bus.clone(),
        Some(SECRET.to_string()),
    );
    routes::app(state)
}

fn post(uri: &str, user: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

async fn send<T: DeserializeOwned>(app: &Router, request: Request<Body>) -> (StatusCode, ApiResponse<T>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_check() {
    let h = Harness::new();
    let response = app(&h).oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_and_accept_over_http() {
    let h = Harness::new();
    let app = app(&h);

    let (status, created) = send::<Offer>(
        &app,
        post(
            "/api/offers",
            Some(h.buyer),
            json!({
                "seller_id": h.seller,
                "product_id": Uuid::new_v4(),
                "price": 50000,
                "quantity": 10,
                "unit": "kg",
                "payment_method": "bank_transfer",
                "delivery_options": ["pickup", "courier", "pickup"]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let offer = created.data.unwrap();
    assert_eq!(offer.status, OfferStatus::Pending);
    assert_eq!(offer.buyer_id, h.buyer);
    assert_eq!(offer.delivery_options.len(), 2);

    let (status, accepted) = send::<Offer>(
        &app,
        post(
            &format!("/api/offers/{}/transition", offer.id),
            Some(h.seller),
            json!({ "status": "accepted" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted.data.unwrap().status, OfferStatus::Accepted);

    let (status, listed) = send::<Vec<Offer>>(
        &app,
        get("/api/offers?role=seller&status=accepted", Some(h.seller)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.data.unwrap().len(), 1);
}

#[tokio::test]
async fn sub_cent_price_is_a_validation_error() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send::<Value>(
        &app,
        post(
            "/api/offers",
            Some(h.buyer),
            json!({
                "seller_id": h.seller,
                "product_id": Uuid::new_v4(),
                "price": "0.004",
                "quantity": 1,
                "unit": "kg"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body.details.unwrap().kind, "validation");
}

#[tokio::test]
async fn errors_carry_kind_and_state() {
    let h = Harness::new();
    let app = app(&h);
    let offer = h.pending_offer().await;

    let (status, body) = send::<Value>(
        &app,
        post(
            &format!("/api/offers/{}/transition", offer.id),
            Some(h.buyer),
            json!({ "status": "shipped" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!body.success);
    let details = body.details.unwrap();
    assert_eq!(details.kind, "invalid_transition");
    assert_eq!(details.current_status, Some(OfferStatus::Pending));
    assert_eq!(details.requested_status, Some(OfferStatus::Shipped));
    assert!(!details.retryable);

    let (status, _) = send::<Value>(
        &app,
        post(
            &format!("/api/offers/{}/transition", offer.id),
            Some(h.buyer),
            json!({ "status": "accepted" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send::<Value>(&app, get(&format!("/api/offers/{}", Uuid::new_v4()), Some(h.buyer))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send::<Value>(&app, get(&format!("/api/offers/{}", offer.id), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_requires_secret_and_acts_as_system() {
    let h = Harness::new();
    let app = app(&h);
    let offer = h.offer_at(OfferStatus::Shipped).await;
    let payload = json!({ "offer_id": offer.id, "status": "to_receive" });

    let (status, _) = send::<Value>(&app, post("/api/offers/webhook", None, payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for wrong in ["logistics-secreT", "logistics", "logistics-secret-extra"] {
        let request = Request::builder()
            .method("POST")
            .uri("/api/offers/webhook")
            .header("content-type", "application/json")
            .header("X-Webhook-Secret", wrong)
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, _) = send::<Value>(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "accepted {wrong:?}");
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/offers/webhook")
        .header("content-type", "application/json")
        .header("X-Webhook-Secret", SECRET)
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send::<Offer>(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let offer = body.data.unwrap();
    assert_eq!(offer.status, OfferStatus::ToReceive);
    assert!(offer.auto_complete_at.is_some());
}

#[tokio::test]
async fn webhook_fails_closed_without_secret() {
    let h = Harness::new();
    let app = routes::app(AppState::with_store(h.store.clone(), h.bus.clone(), None));
    let payload = json!({ "offer_id": Uuid::new_v4(), "status": "to_receive" });

    let (status, _) = send::<Value>(&app, post("/api/offers/webhook", None, payload)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn reviews_over_http() {
    let h = Harness::new();
    let app = app(&h);
    let offer = h.offer_at(OfferStatus::Completed).await;
    let uri = format!("/api/offers/{}/reviews", offer.id);

    let (status, created) = send::<Review>(
        &app,
        post(&uri, Some(h.buyer), json!({ "rating": 5, "comment": "great beans" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.data.unwrap().reviewee_id, h.seller);

    let (status, duplicate) =
        send::<Value>(&app, post(&uri, Some(h.buyer), json!({ "rating": 2 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(duplicate.details.unwrap().kind, "duplicate_review");

    let (status, invalid) =
        send::<Value>(&app, post(&uri, Some(h.seller), json!({ "rating": 9 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(invalid.details.unwrap().kind, "invalid_rating");

    let (status, rating) =
        send::<RatingSummary>(&app, get(&format!("/api/users/{}/rating", h.seller), None)).await;
    assert_eq!(status, StatusCode::OK);
    let rating = rating.data.unwrap();
    assert_eq!(rating.total_reviews, 1);
    assert_eq!(rating.rating, 5.0);

    let (status, reviews) = send::<Vec<Review>>(
        &app,
        get(&format!("/api/users/{}/reviews?limit=10", h.seller), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviews.data.unwrap().len(), 1);
}

#[tokio::test]
async fn storage_is_shared_with_services() {
    let h = Harness::new();
    let state = AppState::with_store(Arc::clone(&h.store), h.bus.clone(), None);
    let offer = h.pending_offer().await;
    assert_eq!(
        state.offer_service.find_offer(offer.id).await.unwrap().id,
        offer.id
    );
}

fn ws_upgrade(user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/ws")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn event_feed_requires_a_caller() {
    let h = Harness::new();
    let app = app(&h);

    let response = app.clone().oneshot(ws_upgrade(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Identified callers get past auth; the in-process request cannot upgrade.
    let response = app.oneshot(ws_upgrade(Some(h.buyer))).await.unwrap();
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
}
