//! In-process event bus.
//!
//! Domain events are fanned out to live subscribers (the admin event stream)
//! over a `tokio` broadcast channel and, when `NATS_URL` is set, published to
//! `storefront.<event name>`.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::DomainEvent;

const CHANNEL_CAPACITY: usize = 256;
const SUBJECT_PREFIX: &str = "storefront";

/// An event as delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct Published {
    pub name: &'static str,
    pub event: DomainEvent,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Published>,
    nats: Option<async_nats::Client>,
}

impl EventBus {
    #[must_use]
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, nats }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.sender.subscribe()
    }

    /// Delivers events to subscribers and NATS. Never fails; NATS errors are logged.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }

    pub async fn publish(&self, event: DomainEvent) {
        let published = Published { name: event.name(), event, at: chrono::Utc::now() };
        tracing::debug!(event = published.name, "Publishing domain event");

        if let Some(nats) = &self.nats {
            match serde_json::to_vec(&published) {
                Ok(payload) => {
                    let subject = format!("{SUBJECT_PREFIX}.{}", published.name);
                    if let Err(e) = nats.publish(subject, payload.into()).await {
                        tracing::warn!(error = %e, event = published.name, "NATS publish failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Could not encode event"),
            }
        }

        // No receivers is fine: nobody is watching the admin stream.
        let _ = self.sender.send(published);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(None);
        let mut rx = bus.subscribe();
        let order_id = Uuid::new_v4();
        bus.publish_all(vec![DomainEvent::Order(OrderEvent::Cancelled { order_id })]).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name, "order.cancelled");
        assert_eq!(received.event, DomainEvent::Order(OrderEvent::Cancelled { order_id }));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(None);
        bus.publish(DomainEvent::Order(OrderEvent::Delivered { order_id: Uuid::nil() })).await;
    }
}
