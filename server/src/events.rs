//! Offer transition events and the fire-and-forget relay to the
//! conversation collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{Actor, OfferStatus};

/// Emitted after every committed status change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferEvent {
    pub offer_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub from_status: OfferStatus,
    pub to_status: OfferStatus,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

impl OfferEvent {
    /// Whether `user_id` is buyer or seller of the offer.
    pub fn involves(&self, user_id: Uuid) -> bool {
        user_id == self.buyer_id || user_id == self.seller_id
    }
}

/// In-process publish/subscribe boundary for offer events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OfferEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish without waiting on subscribers. Never fails the caller.
    pub fn publish(&self, event: OfferEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("No subscribers for offer event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OfferEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// External messaging collaborator that renders events into conversations
#[async_trait]
pub trait ConversationNotifier: Send + Sync {
    async fn notify(&self, event: &OfferEvent) -> anyhow::Result<()>;
}

/// Notifier that only records the event in the log
pub struct LogNotifier;

#[async_trait]
impl ConversationNotifier for LogNotifier {
    async fn notify(&self, event: &OfferEvent) -> anyhow::Result<()> {
        tracing::info!(
            offer_id = %event.offer_id,
            conversation_id = ?event.conversation_id,
            from = %event.from_status,
            to = %event.to_status,
            actor = %event.actor,
            "Offer update ready for conversation"
        );
        Ok(())
    }
}

/// Forward every bus event to `notifier` until the bus is dropped.
///
/// Notifier failures are logged and dropped; they never reach the
/// transition that produced the event.
pub fn spawn_relay(bus: &EventBus, notifier: Arc<dyn ConversationNotifier>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = notifier.notify(&event).await {
                        tracing::warn!(
                            offer_id = %event.offer_id,
                            error = %e,
                            "Conversation notification failed"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification relay lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("Notification relay stopped");
    })
}
