// shipsync-messaging-core/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl MessagingError {
    /// Transport failures are worth another attempt; everything else is deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Publish(_))
    }
}
