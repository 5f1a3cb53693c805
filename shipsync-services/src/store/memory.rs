// shipsync-services/src/store/memory.rs
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{next_stamp, OrderStore, ProductStore, ShipmentStore, StoreError};
use crate::models::{NewShipment, Order, Product, Shipment};
use crate::status::Status;

/// Store backed by in-process maps, for tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<i64, Order>>,
    products: RwLock<HashMap<i64, Product>>,
    shipments: RwLock<HashMap<i64, Shipment>>,
    /// Shipments already taken off product stock.
    stock_events: RwLock<HashSet<i64>>,
    next_shipment_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }

    pub async fn insert_product(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Order, StoreError> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "order", id })
    }

    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id).ok_or(StoreError::NotFound {
            entity: "order",
            id: order.id,
        })?;
        if stored.updated_at != order.updated_at {
            return Err(StoreError::Conflict {
                entity: "order",
                id: order.id,
            });
        }
        *stored = Order {
            updated_at: next_stamp(order.updated_at),
            ..order.clone()
        };
        Ok(stored.clone())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Product, StoreError> {
        self.products
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "product",
                id,
            })
    }

    async fn save(&self, product: &Product) -> Result<Product, StoreError> {
        write_product(&mut *self.products.write().await, product)
    }

    async fn save_for_shipment(
        &self,
        product: &Product,
        shipment_id: i64,
    ) -> Result<Product, StoreError> {
        let mut products = self.products.write().await;
        let mut applied = self.stock_events.write().await;
        if applied.contains(&shipment_id) {
            return Err(StoreError::AlreadyApplied {
                entity: "shipment",
                id: shipment_id,
            });
        }

        let saved = write_product(&mut products, product)?;
        applied.insert(shipment_id);
        Ok(saved)
    }
}

fn write_product(
    products: &mut HashMap<i64, Product>,
    product: &Product,
) -> Result<Product, StoreError> {
    let stored = products.get_mut(&product.id).ok_or(StoreError::NotFound {
        entity: "product",
        id: product.id,
    })?;
    if stored.updated_at != product.updated_at {
        return Err(StoreError::Conflict {
            entity: "product",
            id: product.id,
        });
    }
    *stored = Product {
        updated_at: next_stamp(product.updated_at),
        ..product.clone()
    };
    Ok(stored.clone())
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Shipment, StoreError> {
        self.shipments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "shipment",
                id,
            })
    }

    async fn save(&self, shipment: &Shipment) -> Result<Shipment, StoreError> {
        let mut shipments = self.shipments.write().await;
        let stored = shipments.get_mut(&shipment.id).ok_or(StoreError::NotFound {
            entity: "shipment",
            id: shipment.id,
        })?;
        if stored.updated_at != shipment.updated_at {
            return Err(StoreError::Conflict {
                entity: "shipment",
                id: shipment.id,
            });
        }
        *stored = Shipment {
            updated_at: next_stamp(shipment.updated_at),
            ..shipment.clone()
        };
        Ok(stored.clone())
    }

    async fn find_by_order(&self, order_id: i64) -> Result<Option<Shipment>, StoreError> {
        Ok(self
            .shipments
            .read()
            .await
            .values()
            .find(|s| s.order_id == order_id)
            .cloned())
    }

    async fn create_for_order(&self, new: NewShipment) -> Result<Shipment, StoreError> {
        let mut shipments = self.shipments.write().await;
        if let Some(existing) = shipments.values().find(|s| s.order_id == new.order_id) {
            return Err(StoreError::Conflict {
                entity: "shipment",
                id: existing.id,
            });
        }

        let id = self.next_shipment_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let shipment = Shipment {
            id,
            order_id: new.order_id,
            user_id: Some(new.user_id),
            product_id: new.product_id,
            quantity: new.quantity,
            tracking_number: new.tracking_number,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        };
        shipments.insert(id, shipment.clone());
        Ok(shipment)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.shipments
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                entity: "shipment",
                id,
            })
    }

    async fn list(&self) -> Result<Vec<Shipment>, StoreError> {
        let mut all: Vec<Shipment> = self.shipments.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        Ok(all)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Shipment>, StoreError> {
        let mut own: Vec<Shipment> = self
            .shipments
            .read()
            .await
            .values()
            .filter(|s| s.is_owned_by(user_id))
            .cloned()
            .collect();
        own.sort_by_key(|s| s.id);
        Ok(own)
    }
}
