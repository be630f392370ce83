//! Route definitions for the offer API

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::handlers::*;
use crate::websocket;

// Offer routes
pub fn offer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/offers", post(create_offer).get(list_offers))
        .route("/api/offers/webhook", post(offer_webhook))
        .route("/api/offers/:id", get(get_offer))
        .route("/api/offers/:id/transition", post(transition_offer))
        .route("/api/offers/:id/reviews", post(submit_review))
}

// Review routes
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/:id/reviews", get(list_user_reviews))
        .route("/api/users/:id/rating", get(get_user_rating))
}

/// Full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ws", get(websocket::ws_handler))
        .merge(offer_routes())
        .merge(review_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
