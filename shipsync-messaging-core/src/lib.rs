pub mod bus;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod in_memory_bus;
pub mod publisher;
pub mod retry;
pub mod types;

pub use bus::{dlq_queue, EventBus};
pub use dispatch::EnvelopeDispatcher;
pub use error::MessagingError;
pub use handler::{
    ConsumeOutcome, EventCallback, EventHandler, HandleOutcome, HandlerError, SkipReason,
};
pub use in_memory_bus::InMemoryEventBus;
pub use publisher::EventPublisher;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use types::{EventData, EventEnvelope, EventKind};
