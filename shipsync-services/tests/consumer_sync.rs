// shipsync-services/tests/consumer_sync.rs
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use shipsync_messaging_core::{
    ConsumeOutcome, EnvelopeDispatcher, EventEnvelope, EventHandler, HandleOutcome,
    InMemoryEventBus, SkipReason,
};
use shipsync_services::models::{Order, Product};
use shipsync_services::store::{MemoryStore, OrderStore, ProductStore, StoreError};
use shipsync_services::{OrderStatusConsumer, ProductStockConsumer, Status};

const ORDERS_QUEUE: &str = "orders_events";
const PRODUCTS_QUEUE: &str = "products_events";

fn order(id: i64, status: Status) -> Order {
    Order {
        id,
        user_id: 5,
        product_id: 7,
        quantity: 2,
        total_price: Decimal::new(2100, 2),
        status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn product(id: i64, stock: i32) -> Product {
    Product {
        id,
        name: "widget".into(),
        price: Decimal::new(1050, 2),
        stock,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn envelope(value: serde_json::Value) -> EventEnvelope {
    serde_json::from_value(value).unwrap()
}

fn body(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

async fn orders_with(order: Order) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_order(order).await;
    store
}

#[tokio::test]
async fn paid_event_marks_pending_order_paid() {
    let store = orders_with(order(42, Status::Pending)).await;
    let dispatcher = EnvelopeDispatcher::new("orders", OrderStatusConsumer::new(store.clone()));
    let bus = InMemoryEventBus::new();

    bus.push_raw(
        ORDERS_QUEUE,
        body(json!({"type": "shipment.paid", "data": {"shipment_id": 1, "order_id": 42}})),
    )
    .await;
    let outcomes = bus.drain(ORDERS_QUEUE, &dispatcher).await;

    assert_eq!(outcomes, vec![ConsumeOutcome::Applied]);
    assert_eq!(OrderStore::get(&*store, 42).await.unwrap().status, Status::Paid);
    assert_eq!(bus.depth(ORDERS_QUEUE).await, 0);
}

#[tokio::test]
async fn duplicate_paid_event_is_a_no_op() {
    let store = orders_with(order(42, Status::Pending)).await;
    let consumer = OrderStatusConsumer::new(store.clone());
    let paid = envelope(json!({"type": "shipment.paid", "data": {"order_id": 42}}));

    assert_eq!(consumer.handle(&paid).await.unwrap(), HandleOutcome::Applied);
    let after_first = OrderStore::get(&*store, 42).await.unwrap();

    let second = consumer.handle(&paid).await.unwrap();
    assert_eq!(
        second,
        HandleOutcome::Skipped(SkipReason::AlreadyApplied {
            status: "paid".into()
        })
    );
    assert_eq!(OrderStore::get(&*store, 42).await.unwrap(), after_first);
}

#[tokio::test]
async fn shipped_event_moves_pending_or_paid_orders() {
    for start in [Status::Pending, Status::Paid] {
        let store = orders_with(order(42, start)).await;
        let consumer = OrderStatusConsumer::new(store.clone());
        let shipped = envelope(json!({
            "type": "shipment.shipped",
            "data": {"order_id": 42, "tracking_number": "TRK000000001"}
        }));

        assert_eq!(consumer.handle(&shipped).await.unwrap(), HandleOutcome::Applied);
        assert_eq!(
            OrderStore::get(&*store, 42).await.unwrap().status,
            Status::Shipped
        );
    }
}

#[tokio::test]
async fn backward_transition_is_rejected_without_mutation() {
    let store = orders_with(order(42, Status::Shipped)).await;
    let before = OrderStore::get(&*store, 42).await.unwrap();
    let consumer = OrderStatusConsumer::new(store.clone());

    let outcome = consumer
        .handle(&envelope(json!({"type": "shipment.paid", "data": {"order_id": 42}})))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        HandleOutcome::Skipped(SkipReason::TransitionRejected {
            from: "shipped".into(),
            transition: "mark-paid".into(),
        })
    );
    assert_eq!(OrderStore::get(&*store, 42).await.unwrap(), before);
}

#[tokio::test]
async fn unusable_order_events_are_skipped() {
    let store = orders_with(order(42, Status::Pending)).await;
    let consumer = OrderStatusConsumer::new(store.clone());

    let cases = [
        (
            json!({"type": "shipment.paid", "data": {"shipment_id": 1}}),
            SkipReason::MissingField("order_id"),
        ),
        (
            json!({"type": "shipment.paid", "data": {"order_id": "forty-two"}}),
            SkipReason::InvalidField("order_id"),
        ),
        (
            json!({"type": "shipment.paid", "data": {"order_id": 99}}),
            SkipReason::NotFound {
                entity: "order",
                id: 99,
            },
        ),
        (
            json!({"type": "shipment.returned", "data": {"order_id": 42}}),
            SkipReason::IgnoredEventType("shipment.returned".into()),
        ),
        (
            json!({"type": "shipment.shipped", "data": {"order_id": 42}}),
            SkipReason::MissingField("tracking_number"),
        ),
    ];

    for (event, reason) in cases {
        assert_eq!(
            consumer.handle(&envelope(event)).await.unwrap(),
            HandleOutcome::Skipped(reason)
        );
    }
    assert_eq!(
        OrderStore::get(&*store, 42).await.unwrap().status,
        Status::Pending
    );
}

#[tokio::test]
async fn malformed_messages_are_acked_and_dropped() {
    let store = orders_with(order(42, Status::Pending)).await;
    let dispatcher = EnvelopeDispatcher::new("orders", OrderStatusConsumer::new(store.clone()));
    let bus = InMemoryEventBus::new();

    bus.push_raw(ORDERS_QUEUE, "not json at all").await;
    bus.push_raw(ORDERS_QUEUE, body(json!({"data": {"order_id": 42}})))
        .await;
    bus.push_raw(
        ORDERS_QUEUE,
        body(json!({"type": "shipment.paid", "data": {"order_id": 42}})),
    )
    .await;

    let outcomes = bus.drain(ORDERS_QUEUE, &dispatcher).await;

    assert!(matches!(outcomes[0], ConsumeOutcome::Malformed(_)));
    assert!(matches!(outcomes[1], ConsumeOutcome::Malformed(_)));
    assert_eq!(outcomes[2], ConsumeOutcome::Applied);
    assert_eq!(bus.depth(ORDERS_QUEUE).await, 0);
    assert!(bus.pending(ORDERS_QUEUE).await.is_empty());
}

#[tokio::test]
async fn shipped_quantity_is_clamped_at_zero() {
    let store = Arc::new(MemoryStore::new());
    store.insert_product(product(7, 3)).await;
    let dispatcher = EnvelopeDispatcher::new("products", ProductStockConsumer::new(store.clone()));
    let bus = InMemoryEventBus::new();

    bus.push_raw(
        PRODUCTS_QUEUE,
        body(json!({"type": "shipment.shipped", "data": {"product_id": 7, "quantity": 5}})),
    )
    .await;
    let outcomes = bus.drain(PRODUCTS_QUEUE, &dispatcher).await;

    assert_eq!(outcomes, vec![ConsumeOutcome::Applied]);
    assert_eq!(ProductStore::get(&*store, 7).await.unwrap().stock, 0);
}

#[tokio::test]
async fn redelivered_shipment_takes_stock_once() {
    let store = Arc::new(MemoryStore::new());
    store.insert_product(product(7, 10)).await;
    let dispatcher = EnvelopeDispatcher::new("products", ProductStockConsumer::new(store.clone()));
    let bus = InMemoryEventBus::new();
    let shipped = json!({
        "type": "shipment.shipped",
        "data": {"shipment_id": 1, "product_id": 7, "quantity": 2}
    });

    bus.push_raw(PRODUCTS_QUEUE, body(shipped.clone())).await;
    bus.push_raw(PRODUCTS_QUEUE, body(shipped)).await;
    let outcomes = bus.drain(PRODUCTS_QUEUE, &dispatcher).await;

    assert_eq!(
        outcomes,
        vec![
            ConsumeOutcome::Applied,
            ConsumeOutcome::Skipped(SkipReason::AlreadyApplied {
                status: "shipped".into()
            }),
        ]
    );
    assert_eq!(ProductStore::get(&*store, 7).await.unwrap().stock, 8);
}

#[tokio::test]
async fn stock_consumer_reads_quantities_leniently() {
    let store = Arc::new(MemoryStore::new());
    store.insert_product(product(7, 10)).await;
    let consumer = ProductStockConsumer::new(store.clone());

    let as_text = envelope(json!({
        "type": "shipment.shipped",
        "data": {"product_id": "7", "quantity": "4"}
    }));
    assert_eq!(consumer.handle(&as_text).await.unwrap(), HandleOutcome::Applied);
    assert_eq!(ProductStore::get(&*store, 7).await.unwrap().stock, 6);

    let no_quantity = envelope(json!({"type": "shipment.shipped", "data": {"product_id": 7}}));
    assert_eq!(consumer.handle(&no_quantity).await.unwrap(), HandleOutcome::Applied);
    assert_eq!(ProductStore::get(&*store, 7).await.unwrap().stock, 6);
}

#[tokio::test]
async fn stock_consumer_skips_what_it_cannot_apply() {
    let store = Arc::new(MemoryStore::new());
    store.insert_product(product(7, 10)).await;
    let consumer = ProductStockConsumer::new(store.clone());

    let cases = [
        (
            json!({"type": "shipment.paid", "data": {"product_id": 7, "quantity": 1}}),
            SkipReason::IgnoredEventType("shipment.paid".into()),
        ),
        (
            json!({"type": "shipment.shipped", "data": {"quantity": 1}}),
            SkipReason::MissingField("product_id"),
        ),
        (
            json!({"type": "shipment.shipped", "data": {"product_id": "seven", "quantity": 1}}),
            SkipReason::InvalidField("product_id"),
        ),
        (
            json!({"type": "shipment.shipped", "data": {"product_id": 7, "shipment_id": [1]}}),
            SkipReason::InvalidField("shipment_id"),
        ),
        (
            json!({"type": "shipment.shipped", "data": {"product_id": 7, "quantity": -2}}),
            SkipReason::InvalidField("quantity"),
        ),
        (
            json!({"type": "shipment.shipped", "data": {"product_id": 8, "quantity": 1}}),
            SkipReason::NotFound {
                entity: "product",
                id: 8,
            },
        ),
    ];

    for (event, reason) in cases {
        assert_eq!(
            consumer.handle(&envelope(event)).await.unwrap(),
            HandleOutcome::Skipped(reason)
        );
    }
    assert_eq!(ProductStore::get(&*store, 7).await.unwrap().stock, 10);
}

/// Lets one API-side write land between the consumer's read and its save.
struct RacingOrders {
    inner: MemoryStore,
    raced: AtomicBool,
}

#[async_trait]
impl OrderStore for RacingOrders {
    async fn get(&self, id: i64) -> Result<Order, StoreError> {
        OrderStore::get(&self.inner, id).await
    }

    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut current = OrderStore::get(&self.inner, order.id).await?;
            current.status = Status::Cancelled;
            OrderStore::save(&self.inner, &current).await?;
        }
        OrderStore::save(&self.inner, order).await
    }
}

#[tokio::test]
async fn concurrent_write_is_not_overwritten() {
    let store = Arc::new(RacingOrders {
        inner: MemoryStore::new(),
        raced: AtomicBool::new(false),
    });
    store.inner.insert_order(order(42, Status::Pending)).await;
    let consumer = OrderStatusConsumer::new(store.clone());

    let outcome = consumer
        .handle(&envelope(json!({"type": "shipment.paid", "data": {"order_id": 42}})))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        HandleOutcome::Skipped(SkipReason::TransitionRejected {
            from: "cancelled".into(),
            transition: "mark-paid".into(),
        })
    );
    assert_eq!(
        OrderStore::get(&store.inner, 42).await.unwrap().status,
        Status::Cancelled
    );
}

/// Every save loses the race.
struct StaleOrders {
    inner: MemoryStore,
    saves: AtomicU32,
}

#[async_trait]
impl OrderStore for StaleOrders {
    async fn get(&self, id: i64) -> Result<Order, StoreError> {
        OrderStore::get(&self.inner, id).await
    }

    async fn save(&self, order: &Order) -> Result<Order, StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Conflict {
            entity: "order",
            id: order.id,
        })
    }
}

#[tokio::test]
async fn persistent_conflict_fails_after_bounded_attempts() {
    let store = Arc::new(StaleOrders {
        inner: MemoryStore::new(),
        saves: AtomicU32::new(0),
    });
    store.inner.insert_order(order(42, Status::Pending)).await;
    let dispatcher = EnvelopeDispatcher::new("orders", OrderStatusConsumer::new(store.clone()));
    let bus = InMemoryEventBus::new();

    bus.push_raw(
        ORDERS_QUEUE,
        body(json!({"type": "shipment.paid", "data": {"order_id": 42}})),
    )
    .await;
    let outcomes = bus.drain(ORDERS_QUEUE, &dispatcher).await;

    assert!(matches!(outcomes[..], [ConsumeOutcome::Failed(_)]));
    assert_eq!(store.saves.load(Ordering::SeqCst), 3);
    assert_eq!(bus.depth(ORDERS_QUEUE).await, 0);
}

/// Ships another shipment of the same product between the consumer's read
/// and its first save.
struct RacingProducts {
    inner: MemoryStore,
    raced: AtomicBool,
}

#[async_trait]
impl ProductStore for RacingProducts {
    async fn get(&self, id: i64) -> Result<Product, StoreError> {
        ProductStore::get(&self.inner, id).await
    }

    async fn save(&self, product: &Product) -> Result<Product, StoreError> {
        ProductStore::save(&self.inner, product).await
    }

    async fn save_for_shipment(
        &self,
        product: &Product,
        shipment_id: i64,
    ) -> Result<Product, StoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut current = ProductStore::get(&self.inner, product.id).await?;
            current.decrement_stock(3);
            self.inner.save_for_shipment(&current, 99).await?;
        }
        self.inner.save_for_shipment(product, shipment_id).await
    }
}

#[tokio::test]
async fn stock_conflict_decrements_the_fresh_value() {
    let store = Arc::new(RacingProducts {
        inner: MemoryStore::new(),
        raced: AtomicBool::new(false),
    });
    store.inner.insert_product(product(7, 10)).await;
    let consumer = ProductStockConsumer::new(store.clone());

    let outcome = consumer
        .handle(&envelope(json!({
            "type": "shipment.shipped",
            "data": {"shipment_id": 1, "product_id": 7, "quantity": 2}
        })))
        .await
        .unwrap();

    assert_eq!(outcome, HandleOutcome::Applied);
    assert_eq!(ProductStore::get(&store.inner, 7).await.unwrap().stock, 5);
}

/// Every stock write loses the race.
struct StaleProducts {
    inner: MemoryStore,
    saves: AtomicU32,
}

impl StaleProducts {
    fn conflict(&self, product: &Product) -> StoreError {
        self.saves.fetch_add(1, Ordering::SeqCst);
        StoreError::Conflict {
            entity: "product",
            id: product.id,
        }
    }
}

#[async_trait]
impl ProductStore for StaleProducts {
    async fn get(&self, id: i64) -> Result<Product, StoreError> {
        ProductStore::get(&self.inner, id).await
    }

    async fn save(&self, product: &Product) -> Result<Product, StoreError> {
        Err(self.conflict(product))
    }

    async fn save_for_shipment(
        &self,
        product: &Product,
        _shipment_id: i64,
    ) -> Result<Product, StoreError> {
        Err(self.conflict(product))
    }
}

#[tokio::test]
async fn persistent_stock_conflict_fails_after_bounded_attempts() {
    let store = Arc::new(StaleProducts {
        inner: MemoryStore::new(),
        saves: AtomicU32::new(0),
    });
    store.inner.insert_product(product(7, 10)).await;
    let dispatcher = EnvelopeDispatcher::new("products", ProductStockConsumer::new(store.clone()));
    let bus = InMemoryEventBus::new();

    bus.push_raw(
        PRODUCTS_QUEUE,
        body(json!({
            "type": "shipment.shipped",
            "data": {"shipment_id": 1, "product_id": 7, "quantity": 2}
        })),
    )
    .await;
    let outcomes = bus.drain(PRODUCTS_QUEUE, &dispatcher).await;

    assert!(matches!(outcomes[..], [ConsumeOutcome::Failed(_)]));
    assert_eq!(store.saves.load(Ordering::SeqCst), 3);
    assert_eq!(ProductStore::get(&store.inner, 7).await.unwrap().stock, 10);
}
