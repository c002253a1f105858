//! Message types for the UOF feed protocol
//!
//! Outbound frames are the two control messages the backend understands.
//! Inbound frames are kept as raw JSON and additionally decoded into the
//! shapes the backend is known to send; anything else stays opaque.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control frames sent from client to backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Replace the connection's filters
    Subscribe {
        message_types: Vec<String>,
        event_ids: Vec<String>,
    },

    /// Clear all filters (backend treats this as "everything")
    Unsubscribe,
}

/// Welcome payload sent by the backend right after the upgrade
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Welcome {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
}

/// A feed message relayed from the odds feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UofMessage {
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(default)]
    pub xml: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Typed view over an inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// `{"type":"connected", "data": {...}}`
    Welcome(Welcome),
    /// `{"type":"message", "message_type": ..., ...}`
    Uof(UofMessage),
    /// Any shape not known at compile time
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownFrame {
    Connected {
        #[serde(default)]
        data: Welcome,
    },
    Message(UofMessage),
}

/// An inbound frame: the full parsed payload plus its typed view
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    payload: Value,
    kind: MessageKind,
}

impl FeedMessage {
    /// Parse a raw text frame
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let payload: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(payload))
    }

    /// Wrap an already-parsed payload
    pub fn from_value(payload: Value) -> Self {
        let kind = match KnownFrame::deserialize(&payload) {
            Ok(KnownFrame::Connected { data }) => MessageKind::Welcome(data),
            Ok(KnownFrame::Message(msg)) => MessageKind::Uof(msg),
            Err(_) => MessageKind::Other,
        };

        Self { payload, kind }
    }

    /// The full parsed payload
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Typed view of the payload
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Non-empty `type` field, if any
    pub fn frame_type(&self) -> Option<&str> {
        self.str_field("type")
    }

    /// Non-empty `message_type` field, if any
    pub fn message_type(&self) -> Option<&str> {
        self.str_field("message_type")
    }

    /// Non-empty `event_id` field, if any
    pub fn event_id(&self) -> Option<&str> {
        self.str_field("event_id")
    }

    /// Look up a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}
