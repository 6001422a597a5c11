//! Pusher envelope format
//!
//! Every frame is a JSON object with an `event` name, an optional `channel`
//! and optional `data`. Inbound `data` is usually itself a JSON-encoded
//! string; outbound `data` is a plain object.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ProtocolError;

/// Protocol-level event names
pub mod names {
    pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
    pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
    pub const SUBSCRIBE: &str = "pusher:subscribe";
    pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
    pub const PING: &str = "pusher:ping";
    pub const PONG: &str = "pusher:pong";
    pub const ERROR: &str = "pusher:error";
}

/// A single Pusher frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherEnvelope {
    pub event: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Payload of `pusher:connection_established`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionEstablished {
    pub socket_id: String,
    /// Seconds of inactivity after which the server expects a ping
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

/// Payload of `pusher:error`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PusherErrorData {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

impl PusherEnvelope {
    // === Outbound ===

    /// Subscribe request; public channels carry an empty auth string
    #[must_use]
    pub fn subscribe(channel: &str, auth: Option<&str>) -> Self {
        Self {
            event: names::SUBSCRIBE.to_string(),
            data: Some(json!({ "auth": auth.unwrap_or_default(), "channel": channel })),
            channel: None,
        }
    }

    #[must_use]
    pub fn unsubscribe(channel: &str) -> Self {
        Self {
            event: names::UNSUBSCRIBE.to_string(),
            data: Some(json!({ "auth": "", "channel": channel })),
            channel: None,
        }
    }

    /// Keepalive sent after a quiet period
    #[must_use]
    pub fn ping() -> Self {
        Self {
            event: names::PING.to_string(),
            data: Some(json!({})),
            channel: None,
        }
    }

    #[must_use]
    pub fn pong() -> Self {
        Self {
            event: names::PONG.to_string(),
            data: Some(json!({})),
            channel: None,
        }
    }

    // === Inbound ===

    /// Decode `data`, unwrapping the string encoding if present
    pub fn data_json(&self) -> Result<Value, ProtocolError> {
        match &self.data {
            None => Err(ProtocolError::MissingData {
                event: self.event.clone(),
            }),
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).map_err(|source| ProtocolError::Payload {
                    event: self.event.clone(),
                    source,
                })
            }
            Some(other) => Ok(other.clone()),
        }
    }

    fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.data_json()?).map_err(|source| ProtocolError::Payload {
            event: self.event.clone(),
            source,
        })
    }

    pub fn as_connection_established(&self) -> Result<ConnectionEstablished, ProtocolError> {
        self.data_as()
    }

    pub fn as_error(&self) -> Result<PusherErrorData, ProtocolError> {
        self.data_as()
    }

    #[must_use]
    pub fn is(&self, event: &str) -> bool {
        self.event == event
    }

    // === Utilities ===

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(ProtocolError::Malformed)
    }
}

impl std::fmt::Display for PusherEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.channel {
            Some(channel) => write!(f, "PusherEnvelope(event={}, channel={channel})", self.event),
            None => write!(f, "PusherEnvelope(event={})", self.event),
        }
    }
}
