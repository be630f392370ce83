//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::events::EventBus;
use crate::offers::OfferService;
use crate::reviews::ReviewService;
use crate::store::MarketStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub offer_service: Arc<OfferService>,
    pub review_service: Arc<ReviewService>,
    pub event_bus: EventBus,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        offer_service: Arc<OfferService>,
        review_service: Arc<ReviewService>,
        event_bus: EventBus,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            offer_service,
            review_service,
            event_bus,
            webhook_secret,
        }
    }

    /// Wire both services over one store with default settings.
    pub fn with_store(
        store: Arc<dyn MarketStore>,
        event_bus: EventBus,
        webhook_secret: Option<String>,
    ) -> Self {
        Self::new(
            Arc::new(OfferService::new(store.clone(), event_bus.clone())),
            Arc::new(ReviewService::new(store)),
            event_bus,
            webhook_secret,
        )
    }
}

impl FromRef<AppState> for EventBus {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.event_bus.clone()
    }
}

impl FromRef<AppState> for Arc<OfferService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.offer_service.clone()
    }
}

impl FromRef<AppState> for Arc<ReviewService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.review_service.clone()
    }
}
