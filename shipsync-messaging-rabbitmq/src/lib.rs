mod options;
mod rabbit_event_bus;

pub use options::{dead_letter_arguments, dlq_queue, RabbitMqOptions};
pub use rabbit_event_bus::RabbitEventBus;
