// shipsync-messaging-core/src/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::MessagingError;

/// Flat key/value body carried in `data`.
pub type EventData = Map<String, Value>;

/// Domain events exchanged between services.
///
/// Unknown tags are kept verbatim so consumers can log and acknowledge them
/// instead of failing on shapes they do not understand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    ShipmentPaid,
    ShipmentShipped,
    ShipmentUpdated,
    ShipmentDeleted,
    Unknown(String),
}

impl EventKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "shipment.paid" => Self::ShipmentPaid,
            "shipment.shipped" => Self::ShipmentShipped,
            "shipment.updated" => Self::ShipmentUpdated,
            "shipment.deleted" => Self::ShipmentDeleted,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ShipmentPaid => "shipment.paid",
            Self::ShipmentShipped => "shipment.shipped",
            Self::ShipmentUpdated => "shipment.updated",
            Self::ShipmentDeleted => "shipment.deleted",
            Self::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope: `{"type": "<dot.separated>", "data": {...}}`.
///
/// Older publishers used `event`/`payload`; both spellings decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", alias = "event")]
    pub event_type: String,
    #[serde(default, alias = "payload")]
    pub data: EventData,
}

impl EventEnvelope {
    /// Build an envelope from any serializable payload that flattens to scalars.
    pub fn from_payload<T: Serialize + ?Sized>(
        event_type: &str,
        payload: &T,
    ) -> Result<Self, MessagingError> {
        if event_type.trim().is_empty() {
            return Err(MessagingError::Serialization(
                "event type must not be empty".into(),
            ));
        }

        let data = match serde_json::to_value(payload)
            .map_err(|e| MessagingError::Serialization(e.to_string()))?
        {
            Value::Object(map) => map,
            other => {
                return Err(MessagingError::Serialization(format!(
                    "payload must be a key/value object, got {}",
                    json_kind(&other)
                )))
            }
        };

        if let Some((key, value)) = data
            .iter()
            .find(|(_, v)| matches!(v, Value::Object(_) | Value::Array(_)))
        {
            return Err(MessagingError::Serialization(format!(
                "payload field `{key}` is not a scalar ({})",
                json_kind(value)
            )));
        }

        Ok(Self {
            event_type: event_type.to_string(),
            data,
        })
    }

    /// Decode a queue body. A missing `type` (or a non-JSON body) is malformed.
    pub fn decode(body: &[u8]) -> Result<Self, MessagingError> {
        let envelope: Self =
            serde_json::from_slice(body).map_err(|e| MessagingError::Malformed(e.to_string()))?;
        if envelope.event_type.trim().is_empty() {
            return Err(MessagingError::Malformed("empty event type".into()));
        }
        Ok(envelope)
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|e| MessagingError::Serialization(e.to_string()))
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }

    /// Integer field; numeric strings are accepted because ids arrive either way.
    pub fn field_i64(&self, name: &str) -> Option<i64> {
        match self.data.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.data.get(name).is_some_and(|v| !v.is_null())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
