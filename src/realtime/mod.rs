//! Realtime session: data model, wire events, dispatch and the controller.

pub mod accumulator;
pub mod controller;
pub mod debug_log;
pub mod dispatcher;
pub mod effects;
pub mod events;
pub mod session;
pub mod signaling;
pub mod transport;

pub use accumulator::{Accumulator, Utterance, UtteranceKind};
pub use controller::SessionController;
pub use debug_log::{DebugLog, DebugLogEntry};
pub use dispatcher::{DispatchOutput, EventDispatcher, SessionSignal};
pub use effects::{ChatMessage, Effect, MessageContent, Role};
pub use events::{ClientEvent, ServerEvent, SessionDefaults};
pub use session::{
    ConnectionPhase, ConnectionState, ControlState, Modality, ModalitySet, Session, SessionToken,
    SessionUpdate,
};
pub use signaling::SdpSignaling;
pub use transport::{AudioTrack, MediaSource, PeerConnection, PeerConnector, TransportEvent};
