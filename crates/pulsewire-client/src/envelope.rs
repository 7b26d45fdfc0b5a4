//! The JSON envelope wrapped around every message on the wire.
//!
//! ```json
//! { "type": "task_update", "payload": { ... }, "id": "9f1c...", "timestamp": 1718035200000 }
//! ```
//!
//! `payload` is opaque to the client. `timestamp` is milliseconds since the
//! Unix epoch; peers that send fractional values are accepted and truncated.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ClientError;

/// Reserved type for liveness probes and their echoes.
pub const HEALTH_CHECK_TYPE: &str = "health_check";

/// A message as it travels over the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type, used to route inbound messages to listeners.
    #[serde(rename = "type")]
    pub kind: String,

    /// Business payload.
    #[serde(default)]
    pub payload: Value,

    /// Unique message id. Echoes reuse the id of the message they answer.
    pub id: String,

    /// Send time in milliseconds since the Unix epoch.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
}

impl Envelope {
    /// Wraps `payload` in a fresh envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Builds a liveness probe carrying the client timestamp.
    pub fn health_check() -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        Self {
            kind: HEALTH_CHECK_TYPE.to_string(),
            payload: serde_json::json!({ "timestamp": timestamp }),
            id: Uuid::new_v4().to_string(),
            timestamp,
        }
    }

    /// Returns `true` for probes and probe echoes.
    pub fn is_health_check(&self) -> bool {
        self.kind == HEALTH_CHECK_TYPE
    }

    /// Encodes the envelope as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ClientError> {
        serde_json::to_string(self).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    /// Decodes a frame. Anything that is not a complete envelope is a
    /// protocol error.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ClientError> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|e| ClientError::Protocol(format!("malformed envelope: {e}")))?;
        if envelope.kind.is_empty() {
            return Err(ClientError::Protocol(
                "envelope has an empty type".to_string(),
            ));
        }
        Ok(envelope)
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number
        .as_i64()
        .or_else(|| number.as_f64().map(|f| f as i64))
        .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
}
