//! Marketplace offer server
//!
//! Serves the offer lifecycle API, runs the expiry/auto-completion sweeps
//! and relays offer events to the conversation collaborator.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use chrono::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use marketplace_server::app_state::AppState;
use marketplace_server::config::AppConfig;
use marketplace_server::events::{self, EventBus, LogNotifier};
use marketplace_server::offers::OfferService;
use marketplace_server::reviews::ReviewService;
use marketplace_server::routes;
use marketplace_server::scheduler::Sweeper;
use marketplace_server::store::{MarketStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    tracing::info!("Connecting to database...");
    let pg = PgStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;
    pg.migrate().await.context("failed to run migrations")?;
    tracing::info!("Database connected successfully");

    let store: Arc<dyn MarketStore> = Arc::new(pg);
    let event_bus = EventBus::new(config.event_channel_capacity);

    let offer_service = Arc::new(
        OfferService::new(store.clone(), event_bus.clone())
            .with_auto_complete_after(Duration::days(config.auto_complete_days)),
    );
    let review_service = Arc::new(ReviewService::new(store));

    // Relay events to the conversation collaborator in the background
    let _relay = events::spawn_relay(&event_bus, Arc::new(LogNotifier));

    // Start the expiry/auto-completion sweeps
    let sweeper = Arc::new(Sweeper::new(offer_service.clone(), config.sweep_batch_size));
    let _scheduler = sweeper
        .start(config.sweep_interval)
        .await
        .context("failed to start offer sweeper")?;

    let app_state = AppState::new(
        offer_service,
        review_service,
        event_bus,
        config.webhook_secret.clone(),
    );
    let app = routes::app(app_state).layer(configure_cors(&config.cors_allowed_origins)?);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    tracing::info!("Server starting on {}", addr);
    tracing::info!("WebSocket available at ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn configure_cors(allowed_origins: &[String]) -> anyhow::Result<CorsLayer> {
    if allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return Ok(CorsLayer::permissive());
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any))
}
