//! Inbound event handlers that keep local copies of cross-service state in step.
//!
//! Both follow the same fetch/guard/save cycle. A save that loses an optimistic
//! race re-runs the cycle against the fresh record rather than overwriting it.

mod order_status;
mod product_stock;

pub use order_status::OrderStatusConsumer;
pub use product_stock::ProductStockConsumer;

use shipsync_messaging_core::{EventEnvelope, SkipReason};

use crate::status::TransitionError;

/// Fetch/guard/save cycles attempted before a persistent conflict is reported.
pub const MAX_SAVE_ATTEMPTS: u32 = 3;

fn rejection(err: &TransitionError) -> SkipReason {
    if err.is_replay() {
        SkipReason::AlreadyApplied {
            status: err.from.to_string(),
        }
    } else {
        SkipReason::TransitionRejected {
            from: err.from.to_string(),
            transition: err.transition.to_string(),
        }
    }
}

/// An integer correlation field; absent and unparseable are told apart.
fn id_field(envelope: &EventEnvelope, name: &'static str) -> Result<Option<i64>, SkipReason> {
    match envelope.field_i64(name) {
        Some(id) => Ok(Some(id)),
        None if envelope.has_field(name) => Err(SkipReason::InvalidField(name)),
        None => Ok(None),
    }
}

fn required_id(envelope: &EventEnvelope, name: &'static str) -> Result<i64, SkipReason> {
    id_field(envelope, name)?.ok_or(SkipReason::MissingField(name))
}
