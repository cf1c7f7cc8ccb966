//! Wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{events, Result};

/// Transport-level connection identifier
pub type ConnectionId = String;

/// Logical client session identifier (outlives any single connection)
pub type SessionId = String;

/// A named event with an optional JSON payload.
///
/// On the wire: `{"event": "playlist", "data": {"removeIndex": 0}}`.
/// `data` is omitted for payload-less events; an explicit `null` decodes to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Event without payload
    pub fn bare(event: impl Into<String>) -> Self {
        Self::new(event, None)
    }

    /// Event with a serializable payload
    pub fn with<T: Serialize>(event: impl Into<String>, data: &T) -> Result<Self> {
        let data = serde_json::to_value(data)
            .map_err(|e| crate::Error::EncodeError(e.to_string()))?;
        Ok(Self::new(event, Some(data)))
    }

    /// `ready`, optionally asking the client to bypass its session cache
    pub fn ready(force: bool) -> Self {
        if force {
            Self::new(events::READY, Some(serde_json::json!({ "force": true })))
        } else {
            Self::bare(events::READY)
        }
    }

    /// `disconnected`, naming the connection that superseded the receiver
    pub fn disconnected(successor: &str) -> Self {
        Self::new(events::DISCONNECTED, Some(Value::String(successor.to_string())))
    }

    /// `error`, reporting a failed event back to its sender
    pub fn error(event: &str, message: impl Into<String>) -> Self {
        let payload = ErrorPayload {
            message: message.into(),
            event: event.to_string(),
        };
        Self::new(events::ERROR, serde_json::to_value(&payload).ok())
    }

    /// True when `data` is absent, not an object, or an empty object
    pub fn is_shapeless(&self) -> bool {
        match &self.data {
            Some(Value::Object(map)) => map.is_empty(),
            _ => true,
        }
    }
}

/// Payload of the `error` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub event: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_payload() {
        assert_eq!(Envelope::ready(false).data, None);
        assert_eq!(
            Envelope::ready(true).data,
            Some(serde_json::json!({ "force": true }))
        );
    }

    #[test]
    fn test_shapeless() {
        assert!(Envelope::bare("playlist").is_shapeless());
        assert!(Envelope::new("playlist", Some(serde_json::json!({}))).is_shapeless());
        assert!(Envelope::new("playlist", Some(serde_json::json!(3))).is_shapeless());
        assert!(!Envelope::new("playlist", Some(serde_json::json!({ "forceGet": true }))).is_shapeless());
    }
}
