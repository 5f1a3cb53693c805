//! Fixed catalog of request-path responses.
//!
//! Every response body is `{message, status}`; templates take `{name}`
//! placeholders filled from runtime values.

use std::fmt::Display;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub message: String,
    pub status: u16,
}

impl ApiResponse {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.status_code().is_success()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    ShipmentNotPendingPayment,
    ShipmentNotPaid,
    ShipmentAlreadyShipped,
    ShipmentAlreadyExists,
    ShipmentNotFound,
    ShipmentNotOwner,
    ShipmentNotCancellable,
    OrderServiceUnavailable,
    OrderNotFound,
    OrderUnexpectedResponse,
    OrderInvalidResponse,
    OrderNotPending,
    OrderNotOwner,
    AuthUnauthorized,
    AuthAdminRequired,
    EventsUnavailable,
    StoreFailure,
    ShipmentCreated,
    ShipmentPaid,
    ShipmentShipped,
    ShipmentCancelled,
    ShipmentUpdated,
    ShipmentDeleted,
}

impl MessageKey {
    pub fn key(self) -> &'static str {
        self.entry().0
    }

    pub fn template(self) -> &'static str {
        self.entry().1
    }

    pub fn status(self) -> StatusCode {
        self.entry().2
    }

    fn entry(self) -> (&'static str, &'static str, StatusCode) {
        use MessageKey::*;
        match self {
            ShipmentNotPendingPayment => (
                "shipment.not_pending_payment",
                "Only pending shipments can be paid.",
                StatusCode::BAD_REQUEST,
            ),
            ShipmentNotPaid => (
                "shipment.not_paid",
                "Only paid shipments can be shipped.",
                StatusCode::BAD_REQUEST,
            ),
            ShipmentAlreadyShipped => (
                "shipment.already_shipped",
                "Shipment {shipment_id} has already been shipped.",
                StatusCode::BAD_REQUEST,
            ),
            ShipmentAlreadyExists => (
                "shipment.already_exists",
                "Shipment for order {order_id} already exists.",
                StatusCode::BAD_REQUEST,
            ),
            ShipmentNotFound => (
                "shipment.not_found",
                "Shipment {shipment_id} not found.",
                StatusCode::NOT_FOUND,
            ),
            ShipmentNotOwner => (
                "shipment.not_owner",
                "You do not own this shipment.",
                StatusCode::FORBIDDEN,
            ),
            ShipmentNotCancellable => (
                "shipment.not_cancellable",
                "Shipment {shipment_id} is {status} and cannot be cancelled.",
                StatusCode::BAD_REQUEST,
            ),
            OrderServiceUnavailable => (
                "order.service_unavailable",
                "Order service unavailable: {error}",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            OrderNotFound => (
                "order.not_found",
                "Order {order_id} not found.",
                StatusCode::NOT_FOUND,
            ),
            OrderUnexpectedResponse => (
                "order.unexpected_response",
                "Unexpected response from Order service: {status_code}",
                StatusCode::BAD_GATEWAY,
            ),
            OrderInvalidResponse => (
                "order.invalid_response",
                "Invalid response from Order service.",
                StatusCode::BAD_GATEWAY,
            ),
            OrderNotPending => (
                "order.not_pending",
                "Order {order_id} is not pending, cannot pay shipment.",
                StatusCode::BAD_REQUEST,
            ),
            OrderNotOwner => (
                "order.not_owner",
                "You do not own this order.",
                StatusCode::FORBIDDEN,
            ),
            AuthUnauthorized => (
                "auth.unauthorized",
                "Invalid or expired token: {error}",
                StatusCode::UNAUTHORIZED,
            ),
            AuthAdminRequired => (
                "auth.admin_required",
                "Admin privileges required.",
                StatusCode::FORBIDDEN,
            ),
            EventsUnavailable => (
                "events.unavailable",
                "Event broker unavailable: {error}",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            StoreFailure => (
                "store.failure",
                "Database error.",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            ShipmentCreated => (
                "success.shipment_created",
                "Shipment {shipment_id} created successfully.",
                StatusCode::CREATED,
            ),
            ShipmentPaid => (
                "success.shipment_paid",
                "Shipment {shipment_id} paid successfully.",
                StatusCode::OK,
            ),
            ShipmentShipped => (
                "success.shipment_shipped",
                "Shipment {shipment_id} shipped successfully.",
                StatusCode::OK,
            ),
            ShipmentCancelled => (
                "success.shipment_cancelled",
                "Shipment {shipment_id} cancelled successfully.",
                StatusCode::OK,
            ),
            ShipmentUpdated => (
                "success.shipment_updated",
                "Shipment {shipment_id} updated successfully.",
                StatusCode::OK,
            ),
            ShipmentDeleted => (
                "success.shipment_deleted",
                "Shipment {shipment_id} deleted successfully.",
                StatusCode::OK,
            ),
        }
    }

    /// Fill the template; placeholders without a matching argument stay as written.
    pub fn render(self, args: &[(&str, &dyn Display)]) -> ApiResponse {
        let mut message = self.template().to_string();
        for (name, value) in args {
            message = message.replace(&format!("{{{}}}", name), &value.to_string());
        }

        tracing::debug!(key = self.key(), message = %message, "response rendered");

        ApiResponse {
            message,
            status: self.status().as_u16(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_placeholders() {
        let response = MessageKey::OrderNotPending.render(&[("order_id", &42)]);

        assert_eq!(response.message, "Order 42 is not pending, cannot pay shipment.");
        assert_eq!(response.status, 400);
        assert!(!response.is_success());
    }

    #[test]
    fn success_keys_carry_success_codes() {
        let created = MessageKey::ShipmentCreated.render(&[("shipment_id", &3)]);
        assert_eq!(created.status_code(), StatusCode::CREATED);
        assert!(created.is_success());

        assert_eq!(MessageKey::ShipmentPaid.key(), "success.shipment_paid");
    }

    #[test]
    fn serializes_as_message_and_status() {
        let body = serde_json::to_value(MessageKey::StoreFailure.render(&[])).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"message": "Database error.", "status": 500})
        );
    }
}
