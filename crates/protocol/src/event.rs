use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standard telemetry message shape.
///
/// Any field other than `type`, `source`, `timestamp` and `data` is kept in
/// [`extra`](Self::extra) so nothing the device sent is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    /// Device or channel that produced the message.
    #[serde(
        default,
        alias = "device_id",
        alias = "dev_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<String>,
    /// Device-side timestamp in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub data: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a received [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "body", rename_all = "snake_case")]
pub enum Payload {
    /// The message matched the [`Envelope`] schema.
    Envelope(Envelope),
    /// Valid JSON of any other shape, preserved as-is.
    Opaque(Value),
}

/// One received telemetry message.
///
/// Events are immutable: all fields are private and only exposed through
/// accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    source_id: String,
    received_at: DateTime<Utc>,
    payload: Payload,
}

impl Event {
    pub fn new(source_id: impl Into<String>, received_at: DateTime<Utc>, payload: Payload) -> Self {
        Self {
            source_id: source_id.into(),
            received_at,
            payload,
        }
    }

    /// Device or channel that produced this event.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Local time at which the event was decoded.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Envelope `type`, or `None` for opaque payloads.
    pub fn kind(&self) -> Option<&str> {
        match &self.payload {
            Payload::Envelope(env) => Some(&env.kind),
            Payload::Opaque(_) => None,
        }
    }

    /// Envelope `data`, or the whole document for opaque payloads.
    pub fn data(&self) -> &Value {
        match &self.payload {
            Payload::Envelope(env) => &env.data,
            Payload::Opaque(value) => value,
        }
    }

    /// Deserializes [`data`](Self::data) into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(self.data())
    }
}
