use lapin::types::{AMQPValue, FieldTable};

pub use shipsync_messaging_core::dlq_queue;

#[derive(Clone, Debug)]
pub struct RabbitMqOptions {
    pub uri: String,
    /// Used in the consumer tag.
    pub service: String,
    pub durable: bool,
    /// Unacked deliveries in flight per consumer; 1 keeps handling strictly sequential.
    pub prefetch: u16,
    /// Enables publisher confirms and waits for the broker ACK/NACK.
    pub confirms: bool,
}

impl RabbitMqOptions {
    pub fn from_credentials(host: &str, user: &str, password: &str, service: &str) -> Self {
        Self {
            uri: format!("amqp://{}:{}@{}:5672/%2f", user, password, host),
            service: service.to_string(),
            durable: true,
            prefetch: 1,
            confirms: true,
        }
    }
}

/// Main-queue arguments that route dead letters to `<queue>.dlq` through the
/// default exchange.
pub fn dead_letter_arguments(queue: &str) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString("".into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(dlq_queue(queue).into()),
    );
    args
}
