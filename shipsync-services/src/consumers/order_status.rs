// shipsync-services/src/consumers/order_status.rs
use std::sync::Arc;

use async_trait::async_trait;
use shipsync_messaging_core::{
    EventEnvelope, EventHandler, EventKind, HandleOutcome, HandlerError, SkipReason,
};
use tracing::{info, warn};

use super::{rejection, required_id, MAX_SAVE_ATTEMPTS};
use crate::models::Order;
use crate::status::{Transition, ORDER_TRANSITIONS};
use crate::store::{OrderStore, StoreError};

/// Applies shipment payment and dispatch to the order service's own orders.
pub struct OrderStatusConsumer<S: ?Sized> {
    store: Arc<S>,
}

impl<S: OrderStore + ?Sized> OrderStatusConsumer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn transition_for(envelope: &EventEnvelope) -> Result<Transition, SkipReason> {
        match envelope.kind() {
            EventKind::ShipmentPaid => Ok(Transition::MarkPaid),
            EventKind::ShipmentShipped => {
                if envelope.has_field("tracking_number") {
                    Ok(Transition::MarkShipped)
                } else {
                    Err(SkipReason::MissingField("tracking_number"))
                }
            }
            other => Err(SkipReason::IgnoredEventType(other.to_string())),
        }
    }
}

#[async_trait]
impl<S: OrderStore + ?Sized> EventHandler for OrderStatusConsumer<S> {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<HandleOutcome, HandlerError> {
        let order_id = match required_id(envelope, "order_id") {
            Ok(id) => id,
            Err(reason) => return Ok(HandleOutcome::Skipped(reason)),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            let order = match self.store.get(order_id).await {
                Ok(order) => order,
                Err(StoreError::NotFound { entity, id }) => {
                    return Ok(HandleOutcome::Skipped(SkipReason::NotFound { entity, id }))
                }
                Err(e) => return Err(HandlerError::new(e)),
            };

            let transition = match Self::transition_for(envelope) {
                Ok(transition) => transition,
                Err(reason) => return Ok(HandleOutcome::Skipped(reason)),
            };

            let next = match ORDER_TRANSITIONS.apply(order.status, transition) {
                Ok(next) => next,
                Err(e) => {
                    warn!(
                        order_id,
                        table = ORDER_TRANSITIONS.name(),
                        status = %order.status,
                        transition = %transition,
                        "transition rejected"
                    );
                    return Ok(HandleOutcome::Skipped(rejection(&e)));
                }
            };

            let previous = order.status;
            match self.store.save(&Order { status: next, ..order }).await {
                Ok(_) => {
                    info!(
                        order_id,
                        from = %previous,
                        to = %next,
                        tracking_number = envelope.field_str("tracking_number"),
                        "order status updated"
                    );
                    return Ok(HandleOutcome::Applied);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(order_id, attempt, "order changed concurrently, re-reading");
                }
                Err(e) => return Err(HandlerError::new(e)),
            }
        }
    }
}
