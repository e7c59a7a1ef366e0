use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound message sent back to the telemetry source.
///
/// Built from plain strings and an already-serialized [`Value`], so every
/// `Command` can be encoded without failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: String,
    /// Device the command is addressed to, if the source multiplexes several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Command {
    /// Creates a command with no target and no data.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            data: Value::Null,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attaches a data payload, serializing it eagerly.
    pub fn with_data<T: Serialize>(mut self, data: &T) -> Result<Self, serde_json::Error> {
        self.data = serde_json::to_value(data)?;
        Ok(self)
    }

    /// Converts the command into its JSON wire document.
    pub fn to_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), Value::String(self.kind.clone()));
        if let Some(target) = &self.target {
            obj.insert("target".into(), Value::String(target.clone()));
        }
        if !self.data.is_null() {
            obj.insert("data".into(), self.data.clone());
        }
        Value::Object(obj)
    }
}
