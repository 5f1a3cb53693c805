// shipsync-services/src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::status::Status;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub total_price: Decimal,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Remove shipped units; stock never goes below zero.
    pub fn decrement_stock(&mut self, quantity: i32) {
        self.stock = self.stock.saturating_sub(quantity).max(0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: i64,
    pub order_id: i64,
    pub user_id: Option<i64>,
    /// Copied from the order when the shipment is appointed.
    pub product_id: i64,
    pub quantity: i32,
    pub tracking_number: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }

    pub fn default_tracking_number(&self) -> String {
        format!("TRK{:09}", self.id)
    }
}

/// Fields needed to create a shipment; ids and timestamps come from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShipment {
    pub order_id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub tracking_number: Option<String>,
}

/// Admin patch for a shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ShipmentPatch {
    pub tracking_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i32) -> Product {
        Product {
            id: 7,
            name: "widget".into(),
            price: Decimal::new(1050, 2),
            stock,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stock_is_clamped_at_zero() {
        let mut p = product(3);
        p.decrement_stock(5);
        assert_eq!(p.stock, 0);

        let mut p = product(10);
        p.decrement_stock(4);
        assert_eq!(p.stock, 6);
    }

    #[test]
    fn tracking_number_is_zero_padded() {
        let shipment = Shipment {
            id: 42,
            order_id: 1,
            user_id: Some(2),
            product_id: 3,
            quantity: 1,
            tracking_number: None,
            status: Status::Paid,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(shipment.default_tracking_number(), "TRK000000042");
    }
}
