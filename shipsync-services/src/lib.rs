//! Order, product and shipping service logic on top of the event bus.
//!
//! The shipping side acts on requests and publishes `shipment.*` events; the
//! order and product sides consume them to keep their own records in step.

pub mod auth;
pub mod config;
pub mod consumers;
pub mod messages;
pub mod models;
pub mod order_client;
pub mod runtime;
pub mod shipping;
pub mod status;
pub mod store;
pub mod telemetry;

pub use auth::{AuthError, JwtAuthenticator, Principal};
pub use config::{ConfigError, Environment, ServiceConfig};
pub use consumers::{OrderStatusConsumer, ProductStockConsumer};
pub use messages::{ApiResponse, MessageKey};
pub use order_client::{HttpOrderClient, LookupError, OrderLookup, RemoteOrder};
pub use shipping::{ShippingError, ShippingService};
pub use status::{Status, Transition, TransitionError};
pub use store::{MemoryStore, PgStore, StoreError};
