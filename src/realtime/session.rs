//! Session data model: negotiated settings, connection state, control flags.

use std::collections::BTreeSet;
use std::fmt;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Response modality requested from the realtime endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

/// Ordered set of modalities; text always serializes before audio.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModalitySet(BTreeSet<Modality>);

impl ModalitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text() -> Self {
        [Modality::Text].into_iter().collect()
    }

    pub fn text_and_audio() -> Self {
        [Modality::Text, Modality::Audio].into_iter().collect()
    }

    pub fn with(mut self, modality: Modality) -> Self {
        self.0.insert(modality);
        self
    }

    pub fn insert(&mut self, modality: Modality) -> bool {
        self.0.insert(modality)
    }

    pub fn remove(&mut self, modality: Modality) -> bool {
        self.0.remove(&modality)
    }

    pub fn contains(&self, modality: Modality) -> bool {
        self.0.contains(&modality)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Modality> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<Modality> {
        self.iter().collect()
    }

    /// Parse a comma-separated list such as `"text,audio"`.
    pub fn parse_list(raw: &str) -> Result<Self, strum::ParseError> {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse::<Modality>)
            .collect()
    }
}

impl FromIterator<Modality> for ModalitySet {
    fn from_iter<I: IntoIterator<Item = Modality>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ModalitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|m| m.to_string()).collect();
        f.write_str(&names.join(", "))
    }
}

/// Connection state of the single session owned by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    #[strum(serialize = "Idle")]
    Idle,
    #[strum(serialize = "Connecting...")]
    Connecting,
    #[strum(serialize = "Ready")]
    DataChannelOpen,
    #[strum(serialize = "Updating Session...")]
    Updating,
    #[strum(serialize = "Disconnected")]
    Disconnected,
    #[strum(serialize = "Error")]
    Error,
}

impl ConnectionState {
    /// Whether a new connection attempt may start from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected | Self::Error)
    }

    /// Whether the data channel has been opened and not torn down.
    pub fn is_live(self) -> bool {
        matches!(self, Self::DataChannelOpen | Self::Updating)
    }
}

/// Observable connection phases, emitted strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConnectionPhase {
    Connecting,
    LocalDescriptionSet,
    RemoteDescriptionSet,
    DataChannelOpen,
}

/// Short-lived credential for the realtime endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "SessionToken({prefix}..)")
    }
}

/// The negotiated parameters of one connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub modalities: ModalitySet,
    pub token: Option<SessionToken>,
    pub state: ConnectionState,
}

impl Session {
    pub fn new(
        model: impl Into<String>,
        voice: impl Into<String>,
        instructions: impl Into<String>,
        modalities: ModalitySet,
    ) -> Self {
        Self {
            model: model.into(),
            voice: voice.into(),
            instructions: instructions.into(),
            modalities,
            token: None,
            state: ConnectionState::Idle,
        }
    }
}

/// Requested change to a live session (`session.update`).
///
/// ```
/// use rtc_session::realtime::{Modality, ModalitySet, SessionUpdate};
///
/// let update = SessionUpdate::builder()
///     .voice("alloy")
///     .instructions("Translate into English.")
///     .modalities(ModalitySet::text().with(Modality::Audio))
///     .build();
/// assert_eq!(update.voice, "alloy");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize)]
pub struct SessionUpdate {
    #[builder(into)]
    pub voice: String,
    #[builder(into)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "ModalitySet::is_empty")]
    pub modalities: ModalitySet,
}

/// Which user controls are actionable for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub connect: bool,
    pub disconnect: bool,
    pub model_select: bool,
    pub message_input: bool,
    pub update_session: bool,
}

impl ControlState {
    pub fn for_state(state: ConnectionState, channel_ready: bool) -> Self {
        let idle = state.can_connect();
        Self {
            connect: idle,
            disconnect: state.is_live() || state == ConnectionState::Connecting,
            model_select: idle,
            message_input: channel_ready,
            update_session: channel_ready && state == ConnectionState::DataChannelOpen,
        }
    }
}
