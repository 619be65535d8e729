//! Realtime event types: inbound server events and outbound client events.

use serde::Serialize;
use serde_json::Value;

use super::session::{Modality, ModalitySet, SessionUpdate};
use crate::error::RealtimeError;

/// Server-side session settings echoed in `session.created` / `session.updated`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDefaults {
    pub id: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub modalities: Option<ModalitySet>,
}

impl SessionDefaults {
    fn from_payload(payload: &Value) -> Self {
        let Some(session) = payload.get("session") else {
            return Self::default();
        };
        Self {
            id: string_field(session, "id"),
            model: string_field(session, "model"),
            voice: string_field(session, "voice"),
            instructions: string_field(session, "instructions"),
            modalities: session.get("modalities").and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|name| name.parse::<Modality>().ok())
                    .collect()
            }),
        }
    }
}

/// Events received on the data channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionCreated { session: SessionDefaults, payload: Value },
    SessionUpdated { session: SessionDefaults, payload: Value },
    TextDelta { delta: String },
    TextDone { text: Option<String> },
    TranscriptDelta { delta: String },
    TranscriptDone { transcript: Option<String> },
    ResponseDone { payload: Value },
    Other { event_type: String, payload: Value },
}

impl ServerEvent {
    /// Parse one raw data-channel message.
    pub fn parse(raw: &str) -> Result<Self, RealtimeError> {
        let payload = serde_json::from_str::<Value>(raw).map_err(|error| RealtimeError::Parse {
            message: error.to_string(),
            raw: raw.to_string(),
        })?;
        Ok(Self::from_server_payload(payload))
    }

    /// Classify an already-decoded payload by its `type` discriminator.
    pub fn from_server_payload(payload: Value) -> Self {
        let event_type = string_field(&payload, "type").unwrap_or_default();
        match event_type.as_str() {
            "session.created" => Self::SessionCreated {
                session: SessionDefaults::from_payload(&payload),
                payload,
            },
            "session.updated" => Self::SessionUpdated {
                session: SessionDefaults::from_payload(&payload),
                payload,
            },
            "response.text.delta" => match string_field(&payload, "delta") {
                Some(delta) => Self::TextDelta { delta },
                None => Self::Other { event_type, payload },
            },
            "response.text" => match string_field(&payload, "text") {
                Some(delta) => Self::TextDelta { delta },
                None => Self::Other { event_type, payload },
            },
            "response.text.done" => Self::TextDone {
                text: string_field(&payload, "text"),
            },
            "response.audio_transcript.delta" => match string_field(&payload, "delta") {
                Some(delta) => Self::TranscriptDelta { delta },
                None => Self::Other { event_type, payload },
            },
            "response.audio_transcript.done" => Self::TranscriptDone {
                transcript: string_field(&payload, "transcript"),
            },
            "response.done" => Self::ResponseDone { payload },
            _ => Self::Other { event_type, payload },
        }
    }

    /// The wire `type` of this event.
    pub fn event_type(&self) -> &str {
        match self {
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::TextDelta { .. } => "response.text.delta",
            Self::TextDone { .. } => "response.text.done",
            Self::TranscriptDelta { .. } => "response.audio_transcript.delta",
            Self::TranscriptDone { .. } => "response.audio_transcript.done",
            Self::ResponseDone { .. } => "response.done",
            Self::Other { event_type, .. } => event_type,
        }
    }
}

/// Content part of a user conversation item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
}

/// Conversation item sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: &'static str,
        content: Vec<ContentPart>,
    },
}

/// Options for `response.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseOptions {
    pub modalities: ModalitySet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Events sent on the data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseOptions },
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
}

impl ClientEvent {
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::Message {
                role: "user",
                content: vec![ContentPart::InputText { text: text.into() }],
            },
        }
    }

    pub fn response(modalities: ModalitySet) -> Self {
        Self::ResponseCreate {
            response: ResponseOptions {
                modalities,
                instructions: None,
            },
        }
    }

    pub fn session_update(update: SessionUpdate) -> Self {
        Self::SessionUpdate { session: update }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConversationItemCreate { .. } => "conversation.item.create",
            Self::ResponseCreate { .. } => "response.create",
            Self::SessionUpdate { .. } => "session.update",
        }
    }

    pub fn to_json(&self) -> Result<String, RealtimeError> {
        serde_json::to_string(self).map_err(RealtimeError::from)
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}
