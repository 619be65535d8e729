//! Side effects emitted by the controller for a UI (or test) to render.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use strum::Display;

use super::accumulator::{Utterance, UtteranceKind};
use super::session::{ConnectionPhase, ConnectionState, ControlState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Chat-log content, tagged at the source instead of sniffed at render time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    Json(Value),
}

impl MessageContent {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// Display form: plain text as-is, JSON pretty-printed.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            at: Utc::now(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn user_json(value: Value) -> Self {
        Self::new(Role::User, MessageContent::Json(value))
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn assistant_json(value: Value) -> Self {
        Self::new(Role::Assistant, MessageContent::Json(value))
    }
}

/// One observable change, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    State(ConnectionState),
    Phase(ConnectionPhase),
    Controls(ControlState),
    ChannelReady(bool),
    /// Running text of an open utterance after a delta.
    Partial { kind: UtteranceKind, text: String },
    /// A finished utterance moved into the log.
    Utterance(Utterance),
    Message(ChatMessage),
    /// Single-line user-visible error or status notice.
    Notice(String),
    /// Settings adopted from the server.
    SessionAdopted {
        voice: Option<String>,
        instructions: Option<String>,
    },
}

impl Effect {
    pub fn as_notice(&self) -> Option<&str> {
        match self {
            Self::Notice(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_content_renders_pretty() {
        let content = MessageContent::Json(json!({"type": "response.done"}));
        assert!(content.is_json());
        assert_eq!(content.render(), "{\n  \"type\": \"response.done\"\n}");
        assert_eq!(MessageContent::Text("{not json".into()).render(), "{not json");
    }

    #[test]
    fn message_serializes_with_content_tag() {
        let message = ChatMessage::user_text("hi");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], json!({"kind": "text", "value": "hi"}));
    }
}
