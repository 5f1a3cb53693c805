//! Persistence ports. Each service owns and writes only its own record type.
//!
//! `save` is optimistic: it succeeds only while the stored `updated_at` still
//! equals the one on the record being saved, and stamps a fresh one.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::{NewShipment, Order, Product, Shipment};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: i64 },

    /// The change keyed by `{entity} {id}` was recorded before.
    #[error("{entity} {id} was already applied")]
    AlreadyApplied { entity: &'static str, id: i64 },

    #[error("store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Order, StoreError>;
    async fn save(&self, order: &Order) -> Result<Order, StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Product, StoreError>;
    async fn save(&self, product: &Product) -> Result<Product, StoreError>;
    /// `save` plus a record that `shipment_id` has been taken off stock, in one
    /// unit. A shipment recorded earlier yields `AlreadyApplied` and no write.
    async fn save_for_shipment(
        &self,
        product: &Product,
        shipment_id: i64,
    ) -> Result<Product, StoreError>;
}

#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Shipment, StoreError>;
    async fn save(&self, shipment: &Shipment) -> Result<Shipment, StoreError>;
    async fn find_by_order(&self, order_id: i64) -> Result<Option<Shipment>, StoreError>;
    /// Insert a pending shipment; `Conflict` if the order already has one.
    async fn create_for_order(&self, new: NewShipment) -> Result<Shipment, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<Shipment>, StoreError>;
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Shipment>, StoreError>;
}

/// Strictly increasing `updated_at` even when the clock has not moved.
pub(crate) fn next_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}
