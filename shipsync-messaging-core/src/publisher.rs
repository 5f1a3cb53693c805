// shipsync-messaging-core/src/publisher.rs
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::{EventBus, EventEnvelope, MessagingError};

/// Publishes domain events to one or more durable queues.
///
/// Each target queue belongs to one consuming service. A publish that still
/// fails after the retry policy is exhausted is returned to the caller; the
/// caller's already-committed state change stays as it is.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    queues: Vec<String>,
    policy: RetryPolicy,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, queues: Vec<String>, policy: RetryPolicy) -> Self {
        Self {
            bus,
            queues,
            policy,
        }
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    pub async fn publish<T: Serialize + ?Sized + Sync>(
        &self,
        event_type: &str,
        payload: &T,
    ) -> Result<(), MessagingError> {
        let envelope = EventEnvelope::from_payload(event_type, payload)?;

        for queue in &self.queues {
            self.publish_to(queue, &envelope).await?;
        }
        Ok(())
    }

    async fn publish_to(
        &self,
        queue: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), MessagingError> {
        let bus = &self.bus;
        let context = format!("publish {} -> {}", envelope.event_type, queue);

        let result = retry_with_backoff(
            || async move {
                bus.declare_queue(queue).await?;
                bus.publish(queue, envelope).await
            },
            &self.policy,
            &context,
            MessagingError::is_transient,
        )
        .await;

        match &result {
            Ok(()) => info!(
                event_type = %envelope.event_type,
                queue = %queue,
                "event published"
            ),
            Err(e) => error!(
                event_type = %envelope.event_type,
                queue = %queue,
                error = %e,
                "event publish failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryEventBus;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn publisher(bus: &Arc<InMemoryEventBus>, queues: &[&str]) -> EventPublisher {
        EventPublisher::new(
            bus.clone(),
            queues.iter().map(|q| q.to_string()).collect(),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn publishes_envelope_to_every_queue() {
        let bus = Arc::new(InMemoryEventBus::new());
        let publisher = publisher(&bus, &["orders.events", "products.events"]);

        publisher
            .publish("shipment.paid", &json!({"shipment_id": 1, "order_id": 42}))
            .await
            .unwrap();

        for queue in ["orders.events", "products.events"] {
            let pending = bus.pending(queue).await;
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].event_type, "shipment.paid");
            assert_eq!(pending[0].field_i64("order_id"), Some(42));
        }
        assert!(bus.pending("orders.events.dlq").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_broker_fails_after_full_backoff() {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.set_reachable(false);
        let publisher = publisher(&bus, &["orders.events"]);
        let start = Instant::now();

        let err = publisher
            .publish("shipment.paid", &json!({"order_id": 42}))
            .await
            .unwrap_err();

        assert!(matches!(err, MessagingError::Connection(_)));
        assert!(start.elapsed() >= Duration::from_secs(2 + 4 + 8 + 16));
        assert_eq!(bus.connect_attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_payload_is_not_retried() {
        let bus = Arc::new(InMemoryEventBus::new());
        let publisher = publisher(&bus, &["orders.events"]);
        let start = Instant::now();

        let err = publisher
            .publish("shipment.paid", &json!({"order": {"id": 42}}))
            .await
            .unwrap_err();

        assert!(matches!(err, MessagingError::Serialization(_)));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(bus.pending("orders.events").await.is_empty());
    }
}
