//! Raw inbound message format

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Message flow direction
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Request,
    Response,
}

/// A message as handed to the engine
///
/// # Examples
/// ```
/// use mediation_engine::message::{Direction, Message};
/// use serde_json::json;
///
/// let message: Message = serde_json::from_value(json!({
///     "payload": {"order": 42},
///     "properties": {"tenant": "acme"}
/// })).unwrap();
///
/// assert_eq!(message.direction, Direction::Request);
/// assert!(message.correlation_id.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Caller-supplied correlation identifier; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    #[serde(default)]
    pub direction: Direction,
}

impl Message {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_property<K: Into<String>>(mut self, name: K, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_deserializes_with_defaults() {
        let message: Message = serde_json::from_str("{}").unwrap();
        assert_eq!(message.payload, Value::Null);
        assert!(message.properties.is_empty());
        assert_eq!(message.direction, Direction::Request);
    }

    #[test]
    fn test_direction_serialization() {
        let message = Message::new(json!("x")).with_property("k", json!(1));
        let mut value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["direction"], "request");

        value["direction"] = json!("response");
        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.direction, Direction::Response);
        assert_eq!(parsed.properties["k"], json!(1));
    }
}
