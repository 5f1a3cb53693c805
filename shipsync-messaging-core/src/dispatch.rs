// shipsync-messaging-core/src/dispatch.rs
use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{error, info, warn};

use crate::{
    ConsumeOutcome, EventCallback, EventEnvelope, EventHandler, HandleOutcome, HandlerError,
};

/// Decodes queue bodies and hands envelopes to a typed handler.
///
/// Never surfaces an error to the consume loop: malformed bodies, skipped
/// events, handler failures and handler panics are logged here and the
/// delivery is acked.
pub struct EnvelopeDispatcher<H> {
    consumer: &'static str,
    handler: H,
}

impl<H: EventHandler> EnvelopeDispatcher<H> {
    pub fn new(consumer: &'static str, handler: H) -> Self {
        Self { consumer, handler }
    }
}

#[async_trait]
impl<H: EventHandler> EventCallback for EnvelopeDispatcher<H> {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> ConsumeOutcome {
        let envelope = match EventEnvelope::decode(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    consumer = self.consumer,
                    routing_key = %routing_key,
                    error = %e,
                    body = %String::from_utf8_lossy(body),
                    outcome = "malformed",
                    "dropping undecodable message"
                );
                return ConsumeOutcome::Malformed(e.to_string());
            }
        };

        let handled = AssertUnwindSafe(self.handler.handle(&envelope))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(HandlerError::new(format!(
                    "handler panicked: {}",
                    panic_message(&*panic)
                )))
            });

        match handled {
            Ok(HandleOutcome::Applied) => {
                info!(
                    consumer = self.consumer,
                    event_type = %envelope.event_type,
                    outcome = "applied",
                    "event consumed"
                );
                ConsumeOutcome::Applied
            }
            Ok(HandleOutcome::Skipped(reason)) => {
                warn!(
                    consumer = self.consumer,
                    event_type = %envelope.event_type,
                    reason = %reason,
                    outcome = "skipped",
                    "event consumed without changes"
                );
                ConsumeOutcome::Skipped(reason)
            }
            Err(e) => {
                error!(
                    consumer = self.consumer,
                    event_type = %envelope.event_type,
                    data = %serde_json::Value::Object(envelope.data.clone()),
                    error = %e,
                    outcome = "failed",
                    "event processing failed"
                );
                ConsumeOutcome::Failed(e.to_string())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
