// shipsync-messaging-core/src/bus.rs
use std::sync::Arc;

use async_trait::async_trait;

use crate::{EventCallback, EventEnvelope, MessagingError};

/// Durable queue broker port.
///
/// Every queue has a `<queue>.dlq` sibling that receives dead-lettered messages.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Idempotently declare `queue` and its dead-letter queue.
    async fn declare_queue(&self, queue: &str) -> Result<(), MessagingError>;

    /// Publish a persistent message routed to `queue`.
    async fn publish(&self, queue: &str, envelope: &EventEnvelope) -> Result<(), MessagingError>;

    /// Consume `queue` one message at a time, acknowledging each delivery after
    /// `handler` returns. Only returns when the transport fails.
    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn EventCallback>,
    ) -> Result<(), MessagingError>;
}

pub fn dlq_queue(queue: &str) -> String {
    format!("{}.dlq", queue)
}
