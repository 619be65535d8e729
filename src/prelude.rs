//! Convenience re-exports for common use.

pub use crate::config::{ClientConfig, ClientVariant};
pub use crate::error::{RealtimeError, Result};
pub use crate::realtime::{
    ChatMessage, ConnectionPhase, ConnectionState, ControlState, Effect, MessageContent, Modality,
    ModalitySet, SessionController, SessionUpdate, Utterance, UtteranceKind,
};
