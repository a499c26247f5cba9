use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ConversationId, ConversationKind, Timestamp, UserId};

/// `type` tag of chat message frames on the live hub.
pub const CHAT_MESSAGE_FRAME: &str = "chat_message";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of `GET /chat/conversations/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub participants: Vec<UserId>,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, alias = "last_message_preview")]
    pub last_message: Option<String>,
    #[serde(default, alias = "last_message_at")]
    pub last_message_time: Option<Timestamp>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unread_count: u32,
}

/// One entry of `GET /chat/history/{conversation_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sender: UserId,
    pub content: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateConversationRequest {
    pub participants: Vec<UserId>,
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateConversationResponse {
    pub conversation_id: ConversationId,
}

/// One entry of `GET /chat/search/semantic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchHit {
    pub content: String,
    pub sender: UserId,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
    #[error("frame type tag must be a string")]
    InvalidTypeTag,
    #[error("frame field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Chat message pushed by the hub, both for messages from others and for
/// the echo of the current user's own sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageFrame {
    pub conversation_id: ConversationId,
    pub from: UserId,
    pub content: String,
    pub timestamp: Timestamp,
}

impl ChatMessageFrame {
    fn validate(self) -> Result<Self, FrameError> {
        if self.conversation_id.is_blank() {
            return Err(FrameError::EmptyField("conversation_id"));
        }
        if self.from.is_blank() {
            return Err(FrameError::EmptyField("from"));
        }
        if self.content.trim().is_empty() {
            return Err(FrameError::EmptyField("content"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    ChatMessage(ChatMessageFrame),
    /// Frames for other hub subscribers; the chat engine ignores them.
    Unhandled { kind: String },
}

impl ServerFrame {
    /// Decodes a text frame from the hub. Frames without a `type` tag are
    /// treated as chat messages.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let mut value: Value = serde_json::from_str(text)?;
        let object = value.as_object_mut().ok_or(FrameError::NotAnObject)?;
        let kind = match object.remove("type") {
            None | Some(Value::Null) => None,
            Some(Value::String(kind)) => Some(kind),
            Some(_) => return Err(FrameError::InvalidTypeTag),
        };

        match kind.as_deref() {
            None | Some(CHAT_MESSAGE_FRAME) => {
                let frame: ChatMessageFrame = serde_json::from_value(value)?;
                Ok(Self::ChatMessage(frame.validate()?))
            }
            Some(other) => Ok(Self::Unhandled {
                kind: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    ChatMessage {
        conversation_id: ConversationId,
        content: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untagged_chat_message() {
        let frame = ServerFrame::parse(
            r#"{"conversation_id":"c1","from":"bob","content":"yo","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .expect("frame");
        let ServerFrame::ChatMessage(message) = frame else {
            panic!("expected chat message");
        };
        assert_eq!(message.conversation_id, ConversationId::from("c1"));
        assert_eq!(message.from, UserId::from("bob"));
        assert_eq!(message.content, "yo");
    }

    #[test]
    fn parses_tagged_chat_message_and_ignores_extra_fields() {
        let frame = ServerFrame::parse(
            r#"{"type":"chat_message","conversation_id":"c1","from":"bob","content":"yo","timestamp":"2024-05-01T10:00:00","deck_name":null}"#,
        )
        .expect("frame");
        assert!(matches!(frame, ServerFrame::ChatMessage(_)));
    }

    #[test]
    fn other_frame_types_are_unhandled_not_errors() {
        let frame = ServerFrame::parse(r#"{"type":"learning_update","progress":3}"#).expect("frame");
        assert_eq!(
            frame,
            ServerFrame::Unhandled {
                kind: "learning_update".into()
            }
        );
    }

    #[test]
    fn rejects_frames_missing_required_fields() {
        let err = ServerFrame::parse(r#"{"conversation_id":"c1","content":"yo","timestamp":"2024-05-01T10:00:00Z"}"#)
            .expect_err("missing from");
        assert!(matches!(err, FrameError::Json(_)));
        assert!(matches!(
            ServerFrame::parse("[1,2,3]"),
            Err(FrameError::NotAnObject)
        ));
        assert!(matches!(
            ServerFrame::parse(r#"{"type":7}"#),
            Err(FrameError::InvalidTypeTag)
        ));
    }

    #[test]
    fn rejects_blank_identifiers() {
        let err = ServerFrame::parse(
            r#"{"conversation_id":"  ","from":"bob","content":"yo","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .expect_err("blank conversation");
        assert!(matches!(err, FrameError::EmptyField("conversation_id")));
    }

    #[test]
    fn rejects_empty_content() {
        for content in ["", "   "] {
            let raw = serde_json::json!({
                "conversation_id": "c1",
                "from": "bob",
                "content": content,
                "timestamp": "2024-05-01T10:00:00Z"
            })
            .to_string();
            let err = ServerFrame::parse(&raw).expect_err("empty content");
            assert!(matches!(err, FrameError::EmptyField("content")));
        }
    }

    #[test]
    fn outbound_frame_carries_type_tag() {
        let frame = ClientFrame::ChatMessage {
            conversation_id: ConversationId::from("c1"),
            content: "hello".into(),
        };
        let encoded: Value = serde_json::to_value(&frame).expect("encode");
        assert_eq!(
            encoded,
            serde_json::json!({"type": "chat_message", "conversation_id": "c1", "content": "hello"})
        );
    }

    #[test]
    fn conversation_summary_accepts_both_preview_field_names() {
        let listed: Vec<ConversationSummary> = serde_json::from_str(
            r#"[
                {"id":"c1","participants":["alice","bob"],"type":"private","name":null,
                 "created_at":"2024-05-01T09:00:00","last_message_preview":"hi",
                 "last_message_at":"2024-05-01T10:00:00","unread_count":null},
                {"id":"c2","participants":["alice","bob","carol"],"type":"group","name":"Team",
                 "last_message":"yo","last_message_time":"2024-05-01T11:00:00Z","unread_count":2}
            ]"#,
        )
        .expect("list");
        assert_eq!(listed[0].kind, ConversationKind::Direct);
        assert_eq!(listed[0].last_message.as_deref(), Some("hi"));
        assert_eq!(listed[0].unread_count, 0);
        assert_eq!(listed[1].name.as_deref(), Some("Team"));
        assert_eq!(listed[1].unread_count, 2);
        assert!(listed[1].last_message_time > listed[0].last_message_time);
    }

    #[test]
    fn initiate_request_omits_absent_group_name() {
        let request = InitiateConversationRequest {
            participants: vec![UserId::from("alice"), UserId::from("bob")],
            is_group: false,
            group_name: None,
        };
        let encoded = serde_json::to_value(&request).expect("encode");
        assert_eq!(
            encoded,
            serde_json::json!({"participants": ["alice", "bob"], "is_group": false})
        );
    }
}
