//! WebSocket feed of offer events, scoped to the caller's own offers

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::events::{EventBus, OfferEvent};
use crate::handlers::caller_id;

/// Upgrade to a feed of events for offers where the caller is buyer or seller.
///
/// The caller is identified before the upgrade is inspected, so an
/// anonymous client gets 401 rather than an upgrade error.
pub async fn ws_handler(
    headers: HeaderMap,
    State(bus): State<EventBus>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(caller) => caller,
        Err(e) => return e.into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let rx = bus.subscribe();
    tracing::debug!(user_id = %caller, "WebSocket feed opened");
    ws.on_upgrade(move |socket| stream_events(socket, rx, caller))
}

/// Next event involving `caller`, or `None` once the bus is gone.
async fn next_for(rx: &mut broadcast::Receiver<OfferEvent>, caller: Uuid) -> Option<OfferEvent> {
    loop {
        match rx.recv().await {
            Ok(event) if event.involves(caller) => return Some(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "WebSocket client lagged behind event bus");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn stream_events(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<OfferEvent>,
    caller: Uuid,
) {
    while let Some(event) = next_for(&mut rx, caller).await {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode offer event");
                continue;
            }
        };

        if socket.send(Message::Text(payload)).await.is_err() {
            tracing::debug!(user_id = %caller, "WebSocket client disconnected");
            break;
        }
    }
}
