use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};

use super::{OrderStore, ProductStore, ShipmentStore, StoreError};
use crate::models::{NewShipment, Order, Product, Shipment};
use crate::status::Status;

/// Postgres adapter over the `orders`, `products`, `shipments` and
/// `product_stock_events` tables.
///
/// Updates compare `updated_at` in the WHERE clause and stamp
/// `clock_timestamp()`, so a write that raced ours turns into a `Conflict`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, table: &'static str, id: i64) -> Result<bool, StoreError> {
        let query = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", table);
        let (found,): (bool,) = sqlx::query_as(&query)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    /// Distinguish a lost optimistic race from a deleted row.
    async fn missed_update(
        &self,
        table: &'static str,
        entity: &'static str,
        id: i64,
    ) -> StoreError {
        match self.exists(table, id).await {
            Ok(true) => StoreError::Conflict { entity, id },
            Ok(false) => StoreError::NotFound { entity, id },
            Err(e) => e,
        }
    }
}

fn parse_status(raw: &str) -> Result<Status, StoreError> {
    raw.parse()
        .map_err(|e: crate::status::UnknownStatus| StoreError::Backend(e.to_string()))
}

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    product_id: i64,
    quantity: i32,
    total_price: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: row.quantity,
            total_price: row.total_price,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: Decimal,
    stock: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price: row.price,
            stock: row.stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ShipmentRow {
    id: i64,
    order_id: i64,
    user_id: Option<i64>,
    product_id: i64,
    quantity: i32,
    tracking_number: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = StoreError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(Shipment {
            id: row.id,
            order_id: row.order_id,
            user_id: row.user_id,
            product_id: row.product_id,
            quantity: row.quantity,
            tracking_number: row.tracking_number,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str =
    "id, user_id, product_id, quantity, total_price, status, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, name, price, stock, created_at, updated_at";
const SHIPMENT_COLUMNS: &str = "id, order_id, user_id, product_id, quantity, tracking_number, \
     status, created_at, updated_at";

#[async_trait]
impl OrderStore for PgStore {
    async fn get(&self, id: i64) -> Result<Order, StoreError> {
        let query = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "order", id })?
            .try_into()
    }

    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        let query = format!(
            r#"
            UPDATE orders
            SET user_id = $2, product_id = $3, quantity = $4, total_price = $5,
                status = $6, updated_at = clock_timestamp()
            WHERE id = $1 AND updated_at = $7
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, OrderRow>(&query)
            .bind(order.id)
            .bind(order.user_id)
            .bind(order.product_id)
            .bind(order.quantity)
            .bind(order.total_price)
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.missed_update("orders", "order", order.id).await),
        }
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn get(&self, id: i64) -> Result<Product, StoreError> {
        let query = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        sqlx::query_as::<_, ProductRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::from)
            .ok_or(StoreError::NotFound {
                entity: "product",
                id,
            })
    }

    async fn save(&self, product: &Product) -> Result<Product, StoreError> {
        let mut conn = self.pool.acquire().await?;
        match update_product(&mut conn, product).await? {
            Some(row) => Ok(row.into()),
            None => Err(self.missed_update("products", "product", product.id).await),
        }
    }

    async fn save_for_shipment(
        &self,
        product: &Product,
        shipment_id: i64,
    ) -> Result<Product, StoreError> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO product_stock_events (shipment_id, product_id, applied_at)
            VALUES ($1, $2, clock_timestamp())
            ON CONFLICT (shipment_id) DO NOTHING
            "#,
        )
        .bind(shipment_id)
        .bind(product.id)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::AlreadyApplied {
                entity: "shipment",
                id: shipment_id,
            });
        }

        match update_product(&mut tx, product).await? {
            Some(row) => {
                tx.commit().await?;
                Ok(row.into())
            }
            None => {
                tx.rollback().await?;
                Err(self.missed_update("products", "product", product.id).await)
            }
        }
    }
}

async fn update_product(
    conn: &mut PgConnection,
    product: &Product,
) -> Result<Option<ProductRow>, StoreError> {
    let query = format!(
        r#"
        UPDATE products
        SET name = $2, price = $3, stock = $4, updated_at = clock_timestamp()
        WHERE id = $1 AND updated_at = $5
        RETURNING {}
        "#,
        PRODUCT_COLUMNS
    );
    let row = sqlx::query_as::<_, ProductRow>(&query)
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.updated_at)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

#[async_trait]
impl ShipmentStore for PgStore {
    async fn get(&self, id: i64) -> Result<Shipment, StoreError> {
        let query = format!("SELECT {} FROM shipments WHERE id = $1", SHIPMENT_COLUMNS);
        sqlx::query_as::<_, ShipmentRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "shipment",
                id,
            })?
            .try_into()
    }

    async fn save(&self, shipment: &Shipment) -> Result<Shipment, StoreError> {
        let query = format!(
            r#"
            UPDATE shipments
            SET order_id = $2, user_id = $3, product_id = $4, quantity = $5,
                tracking_number = $6, status = $7, updated_at = clock_timestamp()
            WHERE id = $1 AND updated_at = $8
            RETURNING {}
            "#,
            SHIPMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, ShipmentRow>(&query)
            .bind(shipment.id)
            .bind(shipment.order_id)
            .bind(shipment.user_id)
            .bind(shipment.product_id)
            .bind(shipment.quantity)
            .bind(&shipment.tracking_number)
            .bind(shipment.status.as_str())
            .bind(shipment.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.missed_update("shipments", "shipment", shipment.id).await),
        }
    }

    async fn find_by_order(&self, order_id: i64) -> Result<Option<Shipment>, StoreError> {
        let query = format!(
            "SELECT {} FROM shipments WHERE order_id = $1",
            SHIPMENT_COLUMNS
        );
        sqlx::query_as::<_, ShipmentRow>(&query)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Shipment::try_from)
            .transpose()
    }

    async fn create_for_order(&self, new: NewShipment) -> Result<Shipment, StoreError> {
        let query = format!(
            r#"
            INSERT INTO shipments
                (order_id, user_id, product_id, quantity, tracking_number, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', clock_timestamp(), clock_timestamp())
            ON CONFLICT (order_id) DO NOTHING
            RETURNING {}
            "#,
            SHIPMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, ShipmentRow>(&query)
            .bind(new.order_id)
            .bind(new.user_id)
            .bind(new.product_id)
            .bind(new.quantity)
            .bind(&new.tracking_number)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                let existing = self.find_by_order(new.order_id).await?;
                Err(StoreError::Conflict {
                    entity: "shipment",
                    id: existing.map_or(0, |s| s.id),
                })
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM shipments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "shipment",
                id,
            });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Shipment>, StoreError> {
        let query = format!("SELECT {} FROM shipments ORDER BY id", SHIPMENT_COLUMNS);
        sqlx::query_as::<_, ShipmentRow>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Shipment::try_from)
            .collect()
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Shipment>, StoreError> {
        let query = format!(
            "SELECT {} FROM shipments WHERE user_id = $1 ORDER BY id",
            SHIPMENT_COLUMNS
        );
        sqlx::query_as::<_, ShipmentRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Shipment::try_from)
            .collect()
    }
}
