use crate::error::{Result, StreamMagicError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result code the device reports on success
pub(crate) const SUCCESS_RESULT: i64 = 200;

/// Zone selector required by the device on zone-scoped commands
pub(crate) const ZONE: &str = "ZONE1";

/// Polling-rate hint sent with every subscription request
pub(crate) const SUBSCRIBE_UPDATE_RATE: u32 = 100;

/// One frame of the StreamMagic protocol.
///
/// Every frame is a JSON object routed by `path` and `type`. The protocol
/// has no request IDs; responses are correlated to requests by path alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Resource the frame addresses, e.g. `/zone/play_state`
    pub path: String,

    /// Frame kind; outbound requests omit it on the wire
    #[serde(rename = "type", default)]
    pub kind: MessageType,

    /// Frame payload, passed through unexamined by the core
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Result code, present on responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<i64>,

    /// Human-readable status, present on responses
    #[serde(rename = "message", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Frame kinds carried on the wire
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Client-to-device command; the default when a frame carries no `type`
    #[default]
    Request,
    /// Device answer to an earlier request on the same path
    Response,
    /// Unsolicited push from the device
    Update,
}

impl Message {
    /// Payload body of the frame, if any (`params.data`)
    pub fn data(&self) -> Option<&Value> {
        self.params.get("data")
    }
}

/// Parse a text frame into a [`Message`].
pub(crate) fn parse(frame: &str) -> Result<Message> {
    serde_json::from_str(frame).map_err(|err| StreamMagicError::MalformedMessage(err.to_string()))
}

/// Serialize an outbound request frame: `{"path": ..., "params": {...}}`.
pub(crate) fn encode(path: &str, params: Value) -> Result<String> {
    #[derive(Serialize)]
    struct Frame<'a> {
        path: &'a str,
        params: Map<String, Value>,
    }

    let params = match params {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(StreamMagicError::InvalidParameter(format!(
                "request params must be a JSON object, got {other}"
            )))
        }
    };

    Ok(serde_json::to_string(&Frame { path, params })?)
}
