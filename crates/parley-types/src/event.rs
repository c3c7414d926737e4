//! Wire events exchanged with the presentation client over the real-time
//! transport.
//!
//! Both directions are JSON objects tagged by `type`. The sender of a
//! `send_message` is never part of the payload; it is bound to the
//! authenticated session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ConversationId, Message};
use crate::user::UserId;

/// Default page size for a `history` request without an explicit limit.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Send a direct message to `receiver`.
    SendMessage { receiver: String, message: String },
    /// Catch up on a conversation after reconnecting.
    History {
        peer: String,
        #[serde(default)]
        since: u64,
        #[serde(default = "default_history_limit")]
        limit: u32,
    },
    /// Keep-alive ping. Server responds with `{"type":"pong"}`.
    Ping,
}

fn default_history_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A persisted message, pushed to every delivered session and echoed to
    /// the sending session as acknowledgment.
    NewMessage(NewMessage),
    /// The send request was rejected or could not be persisted.
    SendFailed { code: String, message: String },
    /// Reply to a `history` request, ascending by `message_id`.
    History {
        conversation_id: ConversationId,
        messages: Vec<NewMessage>,
    },
    /// Any other request-level failure (malformed frame, bad peer, ...).
    Error { code: String, message: String },
    Pong,
}

/// Payload of a `new_message` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender: UserId,
    pub receiver: UserId,
    pub message: String,
    pub conversation_id: ConversationId,
    pub message_id: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for NewMessage {
    fn from(msg: &Message) -> Self {
        Self {
            sender: msg.sender_id.clone(),
            receiver: msg.receiver_id.clone(),
            message: msg.body.clone(),
            conversation_id: msg.conversation_id.clone(),
            message_id: msg.message_id,
            created_at: msg.created_at,
        }
    }
}

impl ServerEvent {
    pub fn new_message(msg: &Message) -> Self {
        ServerEvent::NewMessage(NewMessage::from(msg))
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_message() -> Message {
        let a = UserId::parse("alice").unwrap();
        let b = UserId::parse("bob").unwrap();
        Message {
            message_id: 7,
            conversation_id: ConversationId::between(&a, &b),
            sender_id: a,
            receiver_id: b,
            body: "hello".to_string(),
            created_at: Utc::now(),
            delivered: BTreeSet::new(),
        }
    }

    #[test]
    fn test_parse_send_message_frame() {
        let frame = r#"{"type":"send_message","receiver":"bob","message":"hi"}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                receiver: "bob".to_string(),
                message: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_history_frame_defaults() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"history","peer":"bob"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::History {
                peer: "bob".to_string(),
                since: 0,
                limit: DEFAULT_HISTORY_LIMIT
            }
        );
    }

    #[test]
    fn test_sender_field_in_payload_is_ignored() {
        // A client cannot smuggle a sender identity into the request.
        let frame = r#"{"type":"send_message","receiver":"bob","message":"hi","sender":"mallory"}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ClientEvent::SendMessage { .. }));
    }

    #[test]
    fn test_new_message_frame_shape() {
        let event = ServerEvent::new_message(&sample_message());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "new_message");
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["receiver"], "bob");
        assert_eq!(json["message"], "hello");
        assert_eq!(json["conversation_id"], "alice~bob");
        assert_eq!(json["message_id"], 7);
        assert!(json.get("delivered").is_none());
    }

    #[test]
    fn test_pong_frame() {
        let json = serde_json::to_string(&ServerEvent::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
