//! Startup plumbing: builds the consumer and shipping sides from a
//! resolved `ServiceConfig`.

use std::sync::Arc;

use shipsync_messaging_core::{
    EnvelopeDispatcher, EventBus, EventHandler, EventPublisher, RetryPolicy,
};
use shipsync_messaging_rabbitmq::{RabbitEventBus, RabbitMqOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info};

use crate::auth::JwtAuthenticator;
use crate::config::ServiceConfig;
use crate::order_client::HttpOrderClient;
use crate::shipping::ShippingService;
use crate::store::PgStore;

pub async fn connect_database(config: &ServiceConfig) -> anyhow::Result<PgPool> {
    let url = config.require_database_url()?;
    info!("connecting to database");
    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
    Ok(pool)
}

pub fn rabbit_options(config: &ServiceConfig, service: &str) -> RabbitMqOptions {
    let rabbit = &config.rabbitmq;
    RabbitMqOptions::from_credentials(&rabbit.host, &rabbit.user, &rabbit.password, service)
}

/// Publisher fanning out to every configured publish queue.
pub fn event_publisher(config: &ServiceConfig, bus: Arc<dyn EventBus>) -> EventPublisher {
    EventPublisher::new(
        bus,
        config.rabbitmq.publish_queues.clone(),
        RetryPolicy::default(),
    )
}

pub fn authenticator(config: &ServiceConfig) -> JwtAuthenticator {
    JwtAuthenticator::new(&config.jwt_secret)
}

/// Shipping actions over Postgres, the order service and the broker. Nothing
/// connects until the first request needs it.
pub fn shipping_service(
    config: &ServiceConfig,
    pool: PgPool,
) -> anyhow::Result<ShippingService<PgStore, HttpOrderClient>> {
    let options = rabbit_options(config, "shipping");
    let bus: Arc<dyn EventBus> = Arc::new(RabbitEventBus::lazy(options));
    info!(
        queues = ?config.rabbitmq.publish_queues,
        order_service = %config.urls.order_service_url,
        "shipping service configured"
    );

    Ok(ShippingService::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(HttpOrderClient::from_config(config)?),
        event_publisher(config, bus),
    ))
}

/// Connect with backoff and consume the configured queue until the broker
/// goes away. Either failure is returned so the process can exit non-zero.
pub async fn consume_forever<H>(
    config: &ServiceConfig,
    consumer: &'static str,
    handler: H,
) -> anyhow::Result<()>
where
    H: EventHandler + 'static,
{
    let queue = config.rabbitmq.queue.as_str();
    let bus = RabbitEventBus::connect_with_retry(
        rabbit_options(config, consumer),
        &RetryPolicy::default(),
    )
    .await
    .map_err(|e| {
        error!(consumer, host = %config.rabbitmq.host, error = %e, "could not connect to rabbitmq");
        e
    })?;

    info!(consumer, queue, "waiting for events");
    let dispatcher = Arc::new(EnvelopeDispatcher::new(consumer, handler));
    bus.consume(queue, dispatcher).await.map_err(|e| {
        error!(consumer, queue, error = %e, "consumer stopped");
        e
    })?;
    Ok(())
}
