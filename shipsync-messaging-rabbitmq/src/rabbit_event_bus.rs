use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::options::{dead_letter_arguments, dlq_queue, RabbitMqOptions};
use shipsync_messaging_core::{
    retry_with_backoff, EventBus, EventCallback, EventEnvelope, MessagingError, RetryPolicy,
};

/// AMQP persistent delivery mode.
const PERSISTENT: u8 = 2;

struct ConnState {
    conn: Connection,
    pub_ch: Channel,
}

pub struct RabbitEventBus {
    opts: RabbitMqOptions,
    state: Arc<RwLock<Option<ConnState>>>,
}

impl RabbitEventBus {
    pub async fn connect(opts: RabbitMqOptions) -> Result<Self, MessagingError> {
        let bus = Self::lazy(opts);
        bus.connect_once().await?;
        Ok(bus)
    }

    /// Connect using the backoff policy; the last error is returned on exhaustion.
    pub async fn connect_with_retry(
        opts: RabbitMqOptions,
        policy: &RetryPolicy,
    ) -> Result<Self, MessagingError> {
        let bus = Self::lazy(opts);
        retry_with_backoff(
            || bus.connect_once(),
            policy,
            "rabbitmq connect",
            MessagingError::is_transient,
        )
        .await?;
        Ok(bus)
    }

    /// No connection is opened until the first operation needs one.
    pub fn lazy(opts: RabbitMqOptions) -> Self {
        Self {
            opts,
            state: Arc::new(RwLock::new(None)),
        }
    }

    async fn connect_once(&self) -> Result<(), MessagingError> {
        let conn = Connection::connect(&self.opts.uri, ConnectionProperties::default())
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        let ch = conn
            .create_channel()
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        if self.opts.confirms {
            ch.confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| MessagingError::Connection(e.to_string()))?;
        }

        let mut guard = self.state.write().await;
        *guard = Some(ConnState { conn, pub_ch: ch });

        info!(service = %self.opts.service, "RabbitMQ connected");
        Ok(())
    }

    /// Close and forget the cached connection so the next operation reconnects.
    async fn reset(&self) {
        let Some(stale) = self.state.write().await.take() else {
            return;
        };
        if stale.conn.status().connected() {
            if let Err(e) = stale.conn.close(200, "reset after failure").await {
                warn!(service = %self.opts.service, error = %e, "RabbitMQ close failed");
            }
        }
        warn!(service = %self.opts.service, "RabbitMQ connection dropped");
    }

    async fn current_channel(&self) -> Result<Channel, MessagingError> {
        if let Some(ch) = self
            .state
            .read()
            .await
            .as_ref()
            .map(|s| s.pub_ch.clone())
            .filter(|ch| ch.status().connected())
        {
            return Ok(ch);
        }
        self.connect_once().await?;
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.pub_ch.clone())
            .ok_or_else(|| MessagingError::Connection("no channel after reconnect".into()))
    }

    async fn consumer_channel(&self) -> Result<Channel, MessagingError> {
        // Make sure a live connection exists first.
        self.current_channel().await?;
        let guard = self.state.read().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| MessagingError::Connection("no connection".into()))?;
        state
            .conn
            .create_channel()
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))
    }

    fn queue_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            durable: self.opts.durable,
            auto_delete: false,
            exclusive: false,
            nowait: false,
            passive: false,
        }
    }

    async fn declare_queue_pair(&self, queue: &str, ch: &Channel) -> Result<(), MessagingError> {
        ch.queue_declare(&dlq_queue(queue), self.queue_options(), FieldTable::default())
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        ch.queue_declare(queue, self.queue_options(), dead_letter_arguments(queue))
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn publish_on(
        &self,
        ch: &Channel,
        queue: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), MessagingError> {
        let body = envelope.encode()?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT)
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_timestamp(Utc::now().timestamp().max(0) as u64);

        let confirm = ch
            .basic_publish(
                "",
                queue,
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                &body,
                properties,
            )
            .await
            .map_err(|e| MessagingError::Publish(e.to_string()))?
            .await
            .map_err(|e| MessagingError::Publish(e.to_string()))?;

        if confirm.is_nack() {
            return Err(MessagingError::Publish("publisher confirm NACK".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for RabbitEventBus {
    async fn declare_queue(&self, queue: &str) -> Result<(), MessagingError> {
        let ch = self.current_channel().await?;
        let result = self.declare_queue_pair(queue, &ch).await;
        if result.is_err() {
            self.reset().await;
        }
        result
    }

    async fn publish(&self, queue: &str, envelope: &EventEnvelope) -> Result<(), MessagingError> {
        let ch = self.current_channel().await?;
        let result = self.publish_on(&ch, queue, envelope).await;
        if matches!(result, Err(MessagingError::Publish(_))) {
            self.reset().await;
        }
        result
    }

    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn EventCallback>,
    ) -> Result<(), MessagingError> {
        let ch = self.consumer_channel().await?;

        ch.basic_qos(self.opts.prefetch, BasicQosOptions { global: false })
            .await
            .map_err(|e| MessagingError::Subscribe(e.to_string()))?;

        self.declare_queue_pair(queue, &ch).await?;

        let mut consumer = ch
            .basic_consume(
                queue,
                &format!("consumer-{}", self.opts.service),
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Subscribe(e.to_string()))?;

        info!(
            queue = %queue,
            dlq = %dlq_queue(queue),
            service = %self.opts.service,
            "consuming queue"
        );

        while let Some(delivery) = consumer.next().await {
            let d = match delivery {
                Ok(d) => d,
                Err(e) => {
                    error!(queue = %queue, error = %e, "delivery error");
                    self.reset().await;
                    return Err(MessagingError::Connection(e.to_string()));
                }
            };

            let outcome = handler.handle(d.routing_key.as_str(), &d.data).await;

            if let Err(e) = d.ack(BasicAckOptions { multiple: false }).await {
                error!(queue = %queue, error = %e, "ack failed");
                self.reset().await;
                return Err(MessagingError::Connection(e.to_string()));
            }

            debug!(
                queue = %queue,
                delivery_tag = d.delivery_tag,
                message_id = ?d.properties.message_id().as_ref().map(|m| m.as_str()),
                outcome = outcome.label(),
                "delivery acked"
            );
        }

        self.reset().await;
        Err(MessagingError::Connection(format!(
            "consumer stream for {} ended",
            queue
        )))
    }
}
