//! Message Handler (H) — inbound frame parsing and outbound frame shapes
//! for the real-time WebSocket protocol (`spec.md` §4.7).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed inbound client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// `{type: "subscribe", topic}`
    Subscribe {
        /// Topic to subscribe to.
        topic: String,
    },
    /// `{type: "unsubscribe", topic}`
    Unsubscribe {
        /// Topic to unsubscribe from.
        topic: String,
    },
    /// `{type: "ping"}`
    Ping,
    /// `{type: "get_stats"}`
    GetStats,
}

/// A protocol-level rejection of an inbound frame. Distinct from
/// transport errors: the session is not disconnected for these
/// (`spec.md` §4.7 Validation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The frame was not valid JSON.
    InvalidJson,
    /// The frame's `type` field was missing or unrecognized.
    UnknownMessageType,
    /// A `subscribe`/`unsubscribe` frame had a missing or empty `topic`.
    InvalidTopic,
}

impl ParseError {
    /// Stable error code surfaced in the outbound `error` frame.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::UnknownMessageType => "unknown_message_type",
            Self::InvalidTopic => "invalid_topic",
        }
    }

    /// Human-readable message surfaced in the outbound `error` frame.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidJson => "frame is not valid JSON",
            Self::UnknownMessageType => "unrecognized message type",
            Self::InvalidTopic => "topic is missing or empty",
        }
    }
}

/// Parse a raw inbound text frame into a typed [`InboundMessage`].
///
/// # Errors
///
/// Returns the specific [`ParseError`] variant the frame violates, per
/// the protocol's validation rules, rather than a generic failure.
pub fn parse_inbound(raw: &str) -> Result<InboundMessage, ParseError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ParseError::InvalidJson)?;
    let msg_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseError::UnknownMessageType)?;

    match msg_type {
        "subscribe" | "unsubscribe" => {
            let topic = value
                .get("topic")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .ok_or(ParseError::InvalidTopic)?
                .to_string();
            if msg_type == "subscribe" {
                Ok(InboundMessage::Subscribe { topic })
            } else {
                Ok(InboundMessage::Unsubscribe { topic })
            }
        }
        "ping" => Ok(InboundMessage::Ping),
        "get_stats" => Ok(InboundMessage::GetStats),
        _ => Err(ParseError::UnknownMessageType),
    }
}

/// A typed outbound server frame, serialized with an explicit `type` tag
/// so the wire shape matches `spec.md` §4.7 exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Sent once immediately after a successful `connect`.
    ConnectionAck {
        /// The session's client id.
        client_id: String,
        /// Server time at connect, epoch milliseconds.
        timestamp: i64,
    },
    /// Sent after a successful `subscribe`.
    SubscribeAck {
        /// The topic subscribed to.
        topic: String,
        /// Server time, epoch milliseconds.
        timestamp: i64,
    },
    /// Sent after a successful `unsubscribe`.
    UnsubscribeAck {
        /// The topic unsubscribed from.
        topic: String,
        /// Server time, epoch milliseconds.
        timestamp: i64,
    },
    /// Reply to an inbound `ping`.
    Pong {
        /// Server time, epoch milliseconds.
        timestamp: i64,
    },
    /// A broadcast payload stamped with its topic and send time.
    Data {
        /// The topic this payload was published to.
        topic: String,
        /// Opaque application payload.
        payload: Value,
        /// Server time at send, epoch milliseconds.
        timestamp: i64,
    },
    /// A protocol error that does not disconnect the session.
    Error {
        /// Stable machine-readable error code (see [`ParseError::code`]).
        error_code: String,
        /// Human-readable message.
        error_message: String,
        /// Server time, epoch milliseconds.
        timestamp: i64,
    },
}

impl OutboundMessage {
    /// Build an `error` frame from a [`ParseError`] and the current
    /// server time.
    #[must_use]
    pub fn from_parse_error(err: ParseError, timestamp: i64) -> Self {
        Self::Error {
            error_code: err.code().to_string(),
            error_message: err.message().to_string(),
            timestamp,
        }
    }

    /// Serialize to the wire-format JSON string sent over the transport.
    ///
    /// # Panics
    ///
    /// Never panics: every variant holds only JSON-representable data.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","error_code":"internal","error_message":"encode failure","timestamp":0}"#
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe() {
        let msg = parse_inbound(r#"{"type":"subscribe","topic":"stock:600000"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Subscribe {
                topic: "stock:600000".to_string()
            }
        );
    }

    #[test]
    fn parses_ping_and_get_stats() {
        assert_eq!(parse_inbound(r#"{"type":"ping"}"#).unwrap(), InboundMessage::Ping);
        assert_eq!(
            parse_inbound(r#"{"type":"get_stats"}"#).unwrap(),
            InboundMessage::GetStats
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert_eq!(parse_inbound("not json"), Err(ParseError::InvalidJson));
    }

    #[test]
    fn rejects_unknown_type() {
        assert_eq!(
            parse_inbound(r#"{"type":"frobnicate"}"#),
            Err(ParseError::UnknownMessageType)
        );
    }

    #[test]
    fn rejects_missing_type() {
        assert_eq!(parse_inbound(r#"{"topic":"x"}"#), Err(ParseError::UnknownMessageType));
    }

    #[test]
    fn rejects_empty_topic() {
        assert_eq!(
            parse_inbound(r#"{"type":"subscribe","topic":""}"#),
            Err(ParseError::InvalidTopic)
        );
        assert_eq!(
            parse_inbound(r#"{"type":"subscribe"}"#),
            Err(ParseError::InvalidTopic)
        );
    }

    #[test]
    fn outbound_serializes_with_type_tag() {
        let frame = OutboundMessage::Pong { timestamp: 42 };
        assert_eq!(frame.to_json(), r#"{"type":"pong","timestamp":42}"#);
    }

    #[test]
    fn data_frame_carries_topic_and_payload() {
        let frame = OutboundMessage::Data {
            topic: "stock:600000".to_string(),
            payload: serde_json::json!({"price": 12.3}),
            timestamp: 1,
        };
        let json = frame.to_json();
        assert!(json.contains(r#""type":"data""#));
        assert!(json.contains(r#""topic":"stock:600000""#));
    }
}
