// shipsync-services/src/consumers/product_stock.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use shipsync_messaging_core::{
    EventEnvelope, EventHandler, EventKind, HandleOutcome, HandlerError, SkipReason,
};
use tracing::{info, warn};

use super::{id_field, required_id, MAX_SAVE_ATTEMPTS};
use crate::store::{ProductStore, StoreError};

/// Decrements product stock when a shipment leaves the warehouse.
pub struct ProductStockConsumer<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ProductStore + ?Sized> ProductStockConsumer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

/// Absent quantity ships nothing; negative or non-integer quantities are rejected.
fn shipped_quantity(envelope: &EventEnvelope) -> Result<i32, SkipReason> {
    match envelope.data.get("quantity") {
        None | Some(Value::Null) => Ok(0),
        Some(_) => envelope
            .field_i64("quantity")
            .filter(|q| *q >= 0)
            .and_then(|q| i32::try_from(q).ok())
            .ok_or(SkipReason::InvalidField("quantity")),
    }
}

#[async_trait]
impl<S: ProductStore + ?Sized> EventHandler for ProductStockConsumer<S> {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<HandleOutcome, HandlerError> {
        if envelope.kind() != EventKind::ShipmentShipped {
            return Ok(HandleOutcome::Skipped(SkipReason::IgnoredEventType(
                envelope.event_type.clone(),
            )));
        }

        let fields = required_id(envelope, "product_id").and_then(|product_id| {
            let shipment_id = id_field(envelope, "shipment_id")?;
            Ok((product_id, shipment_id, shipped_quantity(envelope)?))
        });
        let (product_id, shipment_id, quantity) = match fields {
            Ok(fields) => fields,
            Err(reason) => return Ok(HandleOutcome::Skipped(reason)),
        };
        if shipment_id.is_none() {
            warn!(product_id, "shipped event has no shipment_id, redelivery cannot be detected");
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut product = match self.store.get(product_id).await {
                Ok(product) => product,
                Err(StoreError::NotFound { entity, id }) => {
                    return Ok(HandleOutcome::Skipped(SkipReason::NotFound { entity, id }))
                }
                Err(e) => return Err(HandlerError::new(e)),
            };

            let old_stock = product.stock;
            product.decrement_stock(quantity);

            let saved = match shipment_id {
                Some(shipment_id) => self.store.save_for_shipment(&product, shipment_id).await,
                None => self.store.save(&product).await,
            };
            match saved {
                Ok(saved) => {
                    info!(
                        product_id,
                        shipment_id,
                        quantity,
                        from = old_stock,
                        to = saved.stock,
                        "product stock updated"
                    );
                    return Ok(HandleOutcome::Applied);
                }
                Err(StoreError::AlreadyApplied { .. }) => {
                    return Ok(HandleOutcome::Skipped(SkipReason::AlreadyApplied {
                        status: "shipped".into(),
                    }))
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(product_id, attempt, "product changed concurrently, re-reading");
                }
                Err(e) => return Err(HandlerError::new(e)),
            }
        }
    }
}
