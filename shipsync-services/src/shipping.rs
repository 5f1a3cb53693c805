//! Request-path shipment actions.
//!
//! Each action validates against the caller, the shipment's lifecycle and,
//! where needed, the upstream order, then commits locally and publishes the
//! matching event. A publish that fails after the commit leaves the local
//! change in place and reports `events.unavailable`.

use std::sync::Arc;

use serde_json::json;
use shipsync_messaging_core::{EventPublisher, MessagingError};
use tracing::{error, info, warn};

use crate::auth::Principal;
use crate::messages::{ApiResponse, MessageKey};
use crate::models::{NewShipment, Shipment, ShipmentPatch};
use crate::order_client::{LookupError, OrderLookup, RemoteOrder};
use crate::status::{Status, Transition, SHIPMENT_TRANSITIONS};
use crate::store::{ShipmentStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("admin privileges required")]
    AdminRequired,

    #[error("shipment {0} not found")]
    ShipmentNotFound(i64),

    #[error("caller does not own shipment {0}")]
    NotShipmentOwner(i64),

    #[error("caller does not own order {0}")]
    NotOrderOwner(i64),

    #[error("shipment {0} has already been shipped")]
    AlreadyShipped(i64),

    #[error("shipment for order {0} already exists")]
    AlreadyExists(i64),

    #[error("shipment {0} is not pending payment")]
    NotPendingPayment(i64),

    #[error("shipment {0} is not paid")]
    NotPaid(i64),

    #[error("shipment {shipment_id} is {status} and cannot be cancelled")]
    NotCancellable { shipment_id: i64, status: Status },

    #[error("order {order_id} is {status}, not pending")]
    OrderNotPending { order_id: i64, status: String },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("event publish failed: {0}")]
    Events(#[from] MessagingError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ShippingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound {
                entity: "shipment",
                id,
            } => ShippingError::ShipmentNotFound(id),
            other => ShippingError::Store(other),
        }
    }
}

impl ShippingError {
    /// Catalog response for this failure.
    pub fn response(&self) -> ApiResponse {
        use ShippingError::*;
        match self {
            AdminRequired => MessageKey::AuthAdminRequired.render(&[]),
            ShipmentNotFound(id) => MessageKey::ShipmentNotFound.render(&[("shipment_id", id)]),
            NotShipmentOwner(_) => MessageKey::ShipmentNotOwner.render(&[]),
            NotOrderOwner(_) => MessageKey::OrderNotOwner.render(&[]),
            AlreadyShipped(id) => MessageKey::ShipmentAlreadyShipped.render(&[("shipment_id", id)]),
            AlreadyExists(order_id) => {
                MessageKey::ShipmentAlreadyExists.render(&[("order_id", order_id)])
            }
            NotPendingPayment(_) => MessageKey::ShipmentNotPendingPayment.render(&[]),
            NotPaid(_) => MessageKey::ShipmentNotPaid.render(&[]),
            NotCancellable {
                shipment_id,
                status,
            } => MessageKey::ShipmentNotCancellable
                .render(&[("shipment_id", shipment_id), ("status", status)]),
            OrderNotPending { order_id, .. } => {
                MessageKey::OrderNotPending.render(&[("order_id", order_id)])
            }
            Lookup(LookupError::NotFound(order_id)) => {
                MessageKey::OrderNotFound.render(&[("order_id", order_id)])
            }
            Lookup(LookupError::Unavailable(e)) => {
                MessageKey::OrderServiceUnavailable.render(&[("error", e)])
            }
            Lookup(LookupError::UnexpectedStatus(code)) => {
                MessageKey::OrderUnexpectedResponse.render(&[("status_code", code)])
            }
            Lookup(LookupError::InvalidResponse(_)) => MessageKey::OrderInvalidResponse.render(&[]),
            Events(e) => MessageKey::EventsUnavailable.render(&[("error", e)]),
            Store(_) => MessageKey::StoreFailure.render(&[]),
        }
    }
}

pub struct ShippingService<S: ?Sized, O: ?Sized> {
    shipments: Arc<S>,
    orders: Arc<O>,
    events: EventPublisher,
}

impl<S, O> ShippingService<S, O>
where
    S: ShipmentStore + ?Sized,
    O: OrderLookup + ?Sized,
{
    pub fn new(shipments: Arc<S>, orders: Arc<O>, events: EventPublisher) -> Self {
        Self {
            shipments,
            orders,
            events,
        }
    }

    /// Create a pending shipment for one of the caller's orders.
    pub async fn appoint(
        &self,
        principal: Principal,
        authorization: Option<&str>,
        order_id: i64,
    ) -> Result<ApiResponse, ShippingError> {
        let order = self.orders.fetch_order(order_id, authorization).await?;
        let owner = required(&order, "user_id", order.user_id)?;
        if owner != principal.user_id {
            warn!(user_id = principal.user_id, order_id, "caller does not own order");
            return Err(ShippingError::NotOrderOwner(order_id));
        }

        if let Some(existing) = self.shipments.find_by_order(order_id).await? {
            return Err(if existing.status == Status::Shipped {
                ShippingError::AlreadyShipped(existing.id)
            } else {
                ShippingError::AlreadyExists(order_id)
            });
        }

        let new = NewShipment {
            order_id,
            user_id: principal.user_id,
            product_id: required(&order, "product_id", order.product_id)?,
            quantity: required(&order, "quantity", order.quantity)?,
            tracking_number: None,
        };
        let shipment = match self.shipments.create_for_order(new).await {
            Ok(shipment) => shipment,
            Err(StoreError::Conflict { .. }) => return Err(ShippingError::AlreadyExists(order_id)),
            Err(e) => return Err(e.into()),
        };
        info!(
            shipment_id = shipment.id,
            order_id,
            user_id = principal.user_id,
            "shipment appointed"
        );

        self.announce(
            "shipment.updated",
            json!({ "shipment_id": shipment.id, "user_id": principal.user_id }),
        )
        .await?;

        Ok(MessageKey::ShipmentCreated.render(&[("shipment_id", &shipment.id)]))
    }

    /// Owner pays a pending shipment whose upstream order is still pending.
    pub async fn pay(
        &self,
        principal: Principal,
        authorization: Option<&str>,
        shipment_id: i64,
    ) -> Result<ApiResponse, ShippingError> {
        let mut shipment = self.shipments.get(shipment_id).await?;
        if !shipment.is_owned_by(principal.user_id) {
            warn!(user_id = principal.user_id, shipment_id, "caller does not own shipment");
            return Err(ShippingError::NotShipmentOwner(shipment_id));
        }

        let next = SHIPMENT_TRANSITIONS
            .apply(shipment.status, Transition::MarkPaid)
            .map_err(|e| {
                warn!(shipment_id, status = %e.from, "shipment not pending payment");
                ShippingError::NotPendingPayment(shipment_id)
            })?;

        let order = self
            .orders
            .fetch_order(shipment.order_id, authorization)
            .await?;
        if order.status != Status::Pending.as_str() {
            warn!(order_id = order.id, status = %order.status, "order is not pending");
            return Err(ShippingError::OrderNotPending {
                order_id: shipment.order_id,
                status: order.status,
            });
        }

        shipment.status = next;
        let saved = self.shipments.save(&shipment).await?;
        info!(shipment_id, order_id = saved.order_id, "shipment paid");

        self.announce(
            "shipment.paid",
            json!({ "shipment_id": saved.id, "order_id": saved.order_id }),
        )
        .await?;

        Ok(MessageKey::ShipmentPaid.render(&[("shipment_id", &saved.id)]))
    }

    /// Admin ships a paid shipment, assigning a tracking number if none is set.
    pub async fn ship(
        &self,
        principal: Principal,
        shipment_id: i64,
    ) -> Result<ApiResponse, ShippingError> {
        require_admin(principal)?;

        let mut shipment = self.shipments.get(shipment_id).await?;
        let next = SHIPMENT_TRANSITIONS
            .apply(shipment.status, Transition::MarkShipped)
            .map_err(|e| {
                warn!(shipment_id, status = %e.from, "shipment cannot be shipped");
                ShippingError::NotPaid(shipment_id)
            })?;

        if shipment.tracking_number.as_deref().map_or(true, str::is_empty) {
            shipment.tracking_number = Some(shipment.default_tracking_number());
        }
        shipment.status = next;
        let saved = self.shipments.save(&shipment).await?;
        info!(
            shipment_id,
            tracking_number = saved.tracking_number.as_deref(),
            "shipment shipped"
        );

        self.announce(
            "shipment.shipped",
            json!({
                "shipment_id": saved.id,
                "order_id": saved.order_id,
                "tracking_number": saved.tracking_number,
                "product_id": saved.product_id,
                "quantity": saved.quantity,
            }),
        )
        .await?;

        Ok(MessageKey::ShipmentShipped.render(&[("shipment_id", &saved.id)]))
    }

    /// Owner or admin cancels a shipment that has not left yet.
    pub async fn cancel(
        &self,
        principal: Principal,
        shipment_id: i64,
    ) -> Result<ApiResponse, ShippingError> {
        let mut shipment = self.shipments.get(shipment_id).await?;
        if !principal.is_admin && !shipment.is_owned_by(principal.user_id) {
            warn!(user_id = principal.user_id, shipment_id, "caller does not own shipment");
            return Err(ShippingError::NotShipmentOwner(shipment_id));
        }

        shipment.status = SHIPMENT_TRANSITIONS
            .apply(shipment.status, Transition::Cancel)
            .map_err(|e| ShippingError::NotCancellable {
                shipment_id,
                status: e.from,
            })?;
        let saved = self.shipments.save(&shipment).await?;
        info!(shipment_id, user_id = principal.user_id, "shipment cancelled");

        self.announce(
            "shipment.updated",
            json!({ "shipment_id": saved.id, "status": saved.status }),
        )
        .await?;

        Ok(MessageKey::ShipmentCancelled.render(&[("shipment_id", &saved.id)]))
    }

    pub async fn update(
        &self,
        principal: Principal,
        shipment_id: i64,
        patch: ShipmentPatch,
    ) -> Result<ApiResponse, ShippingError> {
        require_admin(principal)?;

        let mut shipment = self.shipments.get(shipment_id).await?;
        if let Some(tracking_number) = patch.tracking_number {
            shipment.tracking_number = Some(tracking_number);
        }
        let saved = self.shipments.save(&shipment).await?;
        info!(shipment_id, user_id = principal.user_id, "shipment updated");

        self.announce(
            "shipment.updated",
            json!({ "shipment_id": saved.id, "tracking_number": saved.tracking_number }),
        )
        .await?;

        Ok(MessageKey::ShipmentUpdated.render(&[("shipment_id", &saved.id)]))
    }

    pub async fn delete(
        &self,
        principal: Principal,
        shipment_id: i64,
    ) -> Result<ApiResponse, ShippingError> {
        require_admin(principal)?;

        self.shipments.delete(shipment_id).await?;
        info!(shipment_id, user_id = principal.user_id, "shipment deleted");

        self.announce("shipment.deleted", json!({ "shipment_id": shipment_id }))
            .await?;

        Ok(MessageKey::ShipmentDeleted.render(&[("shipment_id", &shipment_id)]))
    }

    /// Admins see every shipment, everyone else only their own.
    pub async fn list(&self, principal: Principal) -> Result<Vec<Shipment>, ShippingError> {
        let shipments = if principal.is_admin {
            self.shipments.list().await?
        } else {
            self.shipments.list_for_user(principal.user_id).await?
        };
        Ok(shipments)
    }

    async fn announce(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), ShippingError> {
        self.events.publish(event_type, &payload).await.map_err(|e| {
            error!(event_type, error = %e, "state committed but event not published");
            ShippingError::Events(e)
        })
    }
}

fn require_admin(principal: Principal) -> Result<(), ShippingError> {
    if principal.is_admin {
        Ok(())
    } else {
        warn!(user_id = principal.user_id, "admin privileges required");
        Err(ShippingError::AdminRequired)
    }
}

fn required<T>(order: &RemoteOrder, field: &str, value: Option<T>) -> Result<T, ShippingError> {
    value.ok_or_else(|| {
        LookupError::InvalidResponse(format!("order {} has no {}", order.id, field)).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_failures_map_to_gateway_responses() {
        let unavailable =
            ShippingError::Lookup(LookupError::Unavailable("timed out".into())).response();
        assert_eq!(unavailable.status, 503);
        assert_eq!(unavailable.message, "Order service unavailable: timed out");

        let unexpected = ShippingError::Lookup(LookupError::UnexpectedStatus(500)).response();
        assert_eq!(unexpected.status, 502);
        assert_eq!(
            unexpected.message,
            "Unexpected response from Order service: 500"
        );

        let missing = ShippingError::Lookup(LookupError::NotFound(9)).response();
        assert_eq!(missing.status, 404);
        assert_eq!(missing.message, "Order 9 not found.");
    }

    #[test]
    fn missing_shipment_maps_to_not_found() {
        let err: ShippingError = StoreError::NotFound {
            entity: "shipment",
            id: 4,
        }
        .into();
        assert!(matches!(err, ShippingError::ShipmentNotFound(4)));
        assert_eq!(err.response().status, 404);

        let err: ShippingError = StoreError::Backend("down".into()).into();
        assert_eq!(err.response().status, 500);
    }

    #[test]
    fn cancellation_rejection_names_status() {
        let response = ShippingError::NotCancellable {
            shipment_id: 3,
            status: Status::Shipped,
        }
        .response();
        assert_eq!(response.status, 400);
        assert_eq!(
            response.message,
            "Shipment 3 is shipped and cannot be cancelled."
        );
    }
}
