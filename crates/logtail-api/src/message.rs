//! Wire types for frames received over the streaming websocket.
//!
//! Every frame is a JSON object tagged by its `type` field. Only request-log
//! events carry a domain payload; other tags are surfaced as
//! [`IncomingMessage::Other`] so the consumer can decide what to do with them.

use serde::{Deserialize, Serialize};

/// Wire tag of a request-log event frame.
pub const REQUEST_LOG_EVENT: &str = "request_log_event";

/// A request-log event as sent by the server.
///
/// `request_log_id` identifies the logged response and is distinct from the
/// `request_id` inside the payload, which is the identifier of the original
/// API request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEvent {
    /// Opaque JSON document describing the request.
    pub event_payload: String,

    /// Identifier of the request-log entry.
    pub request_log_id: String,

    /// Wire tag, always [`REQUEST_LOG_EVENT`].
    #[serde(rename = "type")]
    pub kind: String,
}

/// One parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingMessage {
    RequestLog(RequestLogEvent),
    /// Any frame with a tag this client does not consume.
    Other { kind: String },
}

/// Minimal view used to peek at the tag before choosing a variant.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

impl IncomingMessage {
    /// Parse a text frame.
    ///
    /// Fails when the frame is not JSON, has no string `type`, or is tagged as
    /// a request-log event but does not have that shape.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let Envelope { kind } = Envelope::deserialize(&value)?;

        if kind == REQUEST_LOG_EVENT {
            RequestLogEvent::deserialize(value).map(Self::RequestLog)
        } else {
            Ok(Self::Other { kind })
        }
    }

    /// The wire tag of this message.
    pub fn kind(&self) -> &str {
        match self {
            Self::RequestLog(event) => &event.kind,
            Self::Other { kind } => kind,
        }
    }

    /// The request-log event, if this is one.
    pub fn as_request_log(&self) -> Option<&RequestLogEvent> {
        match self {
            Self::RequestLog(event) => Some(event),
            Self::Other { .. } => None,
        }
    }
}
