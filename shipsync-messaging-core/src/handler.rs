// shipsync-messaging-core/src/handler.rs
use std::fmt;

use async_trait::async_trait;

use crate::EventEnvelope;

/// Raw delivery callback invoked by a bus consume loop.
///
/// Returns an outcome rather than an error: every delivery is acknowledged
/// once this returns, whatever happened while processing it.
#[async_trait]
pub trait EventCallback: Send + Sync {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> ConsumeOutcome;
}

/// Typed handler for a decoded envelope.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<HandleOutcome, HandlerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Applied,
    Skipped(SkipReason),
}

/// Why a well-formed event did not mutate local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingField(&'static str),
    InvalidField(&'static str),
    NotFound { entity: &'static str, id: i64 },
    IgnoredEventType(String),
    TransitionRejected { from: String, transition: String },
    AlreadyApplied { status: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "missing `{name}` in event data"),
            Self::InvalidField(name) => write!(f, "invalid `{name}` in event data"),
            Self::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            Self::IgnoredEventType(tag) => write!(f, "ignoring event type {tag}"),
            Self::TransitionRejected { from, transition } => {
                write!(f, "{transition} not allowed from {from}")
            }
            Self::AlreadyApplied { status } => write!(f, "already {status}"),
        }
    }
}

/// Processing failure inside a handler (store outage, bug). Logged and acked.
#[derive(Debug, thiserror::Error)]
#[error("handler error: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(err: impl fmt::Display) -> Self {
        Self(err.to_string())
    }
}

/// What the consume loop reports for a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Applied,
    Skipped(SkipReason),
    Malformed(String),
    Failed(String),
}

impl ConsumeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped(_) => "skipped",
            Self::Malformed(_) => "malformed",
            Self::Failed(_) => "failed",
        }
    }
}
