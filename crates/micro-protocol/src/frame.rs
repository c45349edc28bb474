//! Text frames exchanged on the socket transport.
//!
//! Inbound:  `{"event": "call", "id": <ack id>, "data": {"path": "a/b/c", ...}}`
//! Outbound: `{"event": "ack", "id": <ack id>, "data": <envelope>}`
//! Pushed:   `{"event": <name>, "data": ...}` (from takeover handlers)

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CALL_EVENT: &str = "call";
pub const ACK_EVENT: &str = "ack";

/// One socket frame. `id` correlates a call with its acknowledgment; a call
/// without an id expects no acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

impl SocketFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            id: None,
            data,
        }
    }

    pub fn ack(id: Value, data: Value) -> Self {
        Self {
            event: ACK_EVENT.into(),
            id: Some(id),
            data,
        }
    }

    pub fn is_call(&self) -> bool {
        self.event == CALL_EVENT
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
