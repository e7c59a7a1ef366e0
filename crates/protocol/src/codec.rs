//! Conversion between raw payload bytes and [`Event`]/[`Command`] values.

use chrono::Utc;
use serde_json::Value;

use crate::command::Command;
use crate::constants::MAX_PAYLOAD_SIZE;
use crate::event::{Envelope, Event, Payload};

/// Errors from decoding a raw payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("payload too large ({size} bytes, limit {limit})")]
    TooLarge { size: usize, limit: usize },
}

/// Stateless conversion between wire payloads and structured messages.
pub trait Codec: Send + Sync + 'static {
    /// Decodes one inbound payload received on the channel `source_id`.
    fn decode(&self, raw: &[u8], source_id: &str) -> Result<Event, DecodeError>;

    /// Encodes an outbound command. Deterministic for equal commands.
    fn encode(&self, command: &Command) -> Vec<u8>;

    /// Decodes bytes produced by [`encode`](Self::encode) back into a command.
    fn decode_command(&self, raw: &[u8]) -> Result<Command, DecodeError>;
}

/// JSON codec.
///
/// Objects with a string `type` become [`Payload::Envelope`]; any other valid
/// JSON becomes [`Payload::Opaque`]. Only syntactically invalid input fails.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    max_payload: usize,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Creates a codec rejecting payloads larger than `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }

    fn parse(&self, raw: &[u8]) -> Result<Value, DecodeError> {
        if raw.len() > self.max_payload {
            return Err(DecodeError::TooLarge {
                size: raw.len(),
                limit: self.max_payload,
            });
        }
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::MalformedPayload("empty payload".into()));
        }
        serde_json::from_slice(raw).map_err(|e| DecodeError::MalformedPayload(e.to_string()))
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for JsonCodec {
    fn decode(&self, raw: &[u8], source_id: &str) -> Result<Event, DecodeError> {
        let value = self.parse(raw)?;
        let received_at = Utc::now();

        let is_envelope = value.get("type").is_some_and(Value::is_string);
        let envelope = if is_envelope {
            serde_json::from_value::<Envelope>(value.clone()).ok()
        } else {
            None
        };

        let event = match envelope {
            Some(env) => {
                let source = env.source.clone().unwrap_or_else(|| source_id.to_string());
                Event::new(source, received_at, Payload::Envelope(env))
            }
            None => Event::new(source_id, received_at, Payload::Opaque(value)),
        };
        Ok(event)
    }

    fn encode(&self, command: &Command) -> Vec<u8> {
        command.to_value().to_string().into_bytes()
    }

    fn decode_command(&self, raw: &[u8]) -> Result<Command, DecodeError> {
        let value = self.parse(raw)?;
        serde_json::from_value(value).map_err(|e| DecodeError::MalformedPayload(e.to_string()))
    }
}
