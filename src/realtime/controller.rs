//! Session controller: owns the single session and drives it from user
//! operations, transport callbacks and timers.
//!
//! The controller never touches a UI. Every observable change is appended to
//! an effect queue ([`SessionController::drain_effects`]) in the order it
//! happened, and failures are caught at the operation that produced them:
//! the caller gets the error back, a [`Effect::Notice`] carries its one-line
//! form, and the debug log keeps the detail.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::accumulator::{Accumulator, Utterance};
use super::debug_log::DebugLog;
use super::dispatcher::{EventDispatcher, SessionSignal};
use super::effects::{ChatMessage, Effect};
use super::events::{ClientEvent, SessionDefaults};
use super::session::{
    ConnectionPhase, ConnectionState, ControlState, ModalitySet, Session, SessionUpdate,
};
use super::signaling::SdpSignaling;
use super::transport::{
    MediaSource, PeerConnection, PeerConnector, TransportEvent, EVENTS_CHANNEL_LABEL,
};
use crate::backend::TokenFetcher;
use crate::config::ClientConfig;
use crate::error::{ErrorCategory, RealtimeError, Result};
use crate::util::timeout::with_timeout;

/// What woke [`SessionController::step`].
enum Wake {
    Transport(Option<TransportEvent>),
    Timer,
}

pub struct SessionController {
    config: ClientConfig,
    media: Arc<dyn MediaSource>,
    connector: Arc<dyn PeerConnector>,
    tokens: TokenFetcher,
    signaling: SdpSignaling,
    session: Session,
    dispatcher: EventDispatcher,
    debug_log: DebugLog,
    messages: Vec<ChatMessage>,
    effects: Vec<Effect>,
    peer: Option<Box<dyn PeerConnection>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    channel_ready: bool,
    phase: Option<ConnectionPhase>,
    update_deadline: Option<Instant>,
    auto_update_at: Option<Instant>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("variant", &self.config.variant)
            .field("state", &self.session.state)
            .field("phase", &self.phase)
            .field("channel_ready", &self.channel_ready)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    pub fn new(
        config: ClientConfig,
        media: Arc<dyn MediaSource>,
        connector: Arc<dyn PeerConnector>,
    ) -> Result<Self> {
        config.validate()?;
        let tokens = TokenFetcher::from_config(&config)?;
        let signaling = SdpSignaling::from_config(&config)?;
        let session = Session::new(
            config.model.clone(),
            config.voice.clone(),
            config.instructions.clone(),
            config.modalities.clone(),
        );
        Ok(Self {
            dispatcher: EventDispatcher::new(config.variant),
            config,
            media,
            connector,
            tokens,
            signaling,
            session,
            debug_log: DebugLog::new(),
            messages: Vec::new(),
            effects: Vec::new(),
            peer: None,
            events: None,
            channel_ready: false,
            phase: None,
            update_deadline: None,
            auto_update_at: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    pub fn phase(&self) -> Option<ConnectionPhase> {
        self.phase
    }

    pub fn is_channel_ready(&self) -> bool {
        self.channel_ready
    }

    pub fn controls(&self) -> ControlState {
        ControlState::for_state(self.session.state, self.channel_ready)
    }

    pub fn accumulator(&self) -> &Accumulator {
        self.dispatcher.accumulator()
    }

    /// Finished utterances in completion order.
    pub fn utterances(&self) -> &[Utterance] {
        self.dispatcher.accumulator().log()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.debug_log
    }

    /// Take every effect emitted since the last drain.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Whether an update is waiting for `session.updated`.
    pub fn update_pending(&self) -> bool {
        self.update_deadline.is_some()
    }

    /// Pick the model for the next connection.
    pub fn set_model(&mut self, model: impl Into<String>) -> Result<()> {
        if !self.controls().model_select {
            let error = RealtimeError::InvalidState(
                "The model can only be changed while disconnected".into(),
            );
            self.report(&error);
            return Err(error);
        }
        self.session.model = model.into();
        Ok(())
    }

    pub fn set_voice(&mut self, voice: impl Into<String>) {
        self.session.voice = voice.into();
    }

    pub fn set_instructions(&mut self, instructions: impl Into<String>) {
        self.session.instructions = instructions.into();
    }

    pub fn set_modalities(&mut self, modalities: ModalitySet) {
        self.session.modalities = modalities;
    }

    /// Establish a session: token, microphone, peer connection, SDP exchange.
    ///
    /// Returns once the remote description is applied; the data channel
    /// opens later through [`step`](Self::step).
    pub async fn connect(&mut self) -> Result<()> {
        if !self.session.state.can_connect() {
            let error = RealtimeError::InvalidState(format!(
                "Cannot connect while {}",
                self.session.state
            ));
            self.report(&error);
            return Err(error);
        }

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.report(&error);
                if error.category() == ErrorCategory::Signaling {
                    self.debug_log
                        .push("Forcing disconnect after signaling failure");
                    self.disconnect();
                } else {
                    self.teardown();
                    self.set_state(ConnectionState::Error);
                }
                Err(error)
            }
        }
    }

    async fn establish(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        self.set_phase(ConnectionPhase::Connecting);
        let model = self.session.model.clone();

        self.debug_log
            .push(format!("Fetching session token from {}", self.tokens.endpoint()));
        let token = if self.config.variant.posts_instructions() {
            let instructions = self.session.instructions.clone();
            self.tokens
                .fetch_with_instructions(&model, &instructions)
                .await?
        } else {
            self.tokens.fetch(&model).await?
        };
        self.debug_log.push("Session token received");
        self.session.token = Some(token.clone());

        self.debug_log.push("Requesting microphone access...");
        let acquire = self.media.acquire_microphone();
        let track = match self.config.media_timeout {
            Some(limit) => with_timeout(limit, acquire)
                .await
                .map_err(|error| match error {
                    RealtimeError::Timeout(ms) => RealtimeError::MediaAcquisition(format!(
                        "No microphone response after {ms}ms"
                    )),
                    other => other,
                })?,
            None => acquire.await?,
        };
        self.debug_log
            .push(format!("Microphone access granted ({})", track.id));

        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        self.peer = Some(self.connector.open(tx).await?);
        self.debug_log.push("Peer connection created");

        self.peer_mut()?.add_track(track)?;
        self.peer_mut()?.create_data_channel(EVENTS_CHANNEL_LABEL)?;
        self.debug_log
            .push(format!("Data channel '{EVENTS_CHANNEL_LABEL}' created"));

        self.debug_log.push("Creating offer...");
        let offer = self.peer_mut()?.create_offer().await?;
        self.peer_mut()?.set_local_description(&offer).await?;
        self.set_phase(ConnectionPhase::LocalDescriptionSet);

        self.debug_log
            .push(format!("Sending SDP offer to {}", self.signaling.endpoint()));
        let answer = self.signaling.exchange(&offer, &token, &model).await?;
        self.peer_mut()?.set_remote_description(&answer).await?;
        self.set_phase(ConnectionPhase::RemoteDescriptionSet);

        info!(model = %model, variant = %self.config.variant, "Realtime session negotiated");
        Ok(())
    }

    /// Wait for the next transport event or due timer and handle it.
    ///
    /// Returns `false` when there is nothing left to wait for.
    pub async fn step(&mut self) -> bool {
        let deadline = self.next_deadline();
        if self.events.is_none() && deadline.is_none() {
            return false;
        }

        let wake = tokio::select! {
            biased;
            event = recv_opt(self.events.as_mut()) => Wake::Transport(event),
            () = sleep_until_opt(deadline) => Wake::Timer,
        };

        match wake {
            Wake::Transport(Some(event)) => self.handle_transport_event(event),
            Wake::Transport(None) => {
                self.debug_log.push("Transport event queue closed");
                self.events = None;
            }
            Wake::Timer => self.fire_due_timers(Instant::now()),
        }
        true
    }

    /// Handle every transport event already queued and any timers that are
    /// due, without waiting. Returns the number of transport events handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.handle_transport_event(event);
            handled += 1;
        }
        self.fire_due_timers(Instant::now());
        handled
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ChannelOpen => {
                self.debug_log.push("Data channel opened");
                self.set_channel_ready(true);
                self.set_phase(ConnectionPhase::DataChannelOpen);
                self.set_state(ConnectionState::DataChannelOpen);
            }
            TransportEvent::Message(raw) => {
                let output = self.dispatcher.dispatch(&raw, &mut self.debug_log);
                for effect in output.effects {
                    self.emit(effect);
                }
                match output.signal {
                    Some(SessionSignal::Created(defaults)) => self.on_session_created(defaults),
                    Some(SessionSignal::Updated(defaults)) => self.on_session_updated(defaults),
                    None => {}
                }
            }
            TransportEvent::ChannelError(reason) => {
                self.report(&RealtimeError::Channel(reason));
            }
            TransportEvent::ChannelClosed => {
                self.debug_log.push("Data channel closed");
                self.set_channel_ready(false);
            }
            TransportEvent::RemoteTrack => {
                self.debug_log.push("Remote audio track received");
            }
            TransportEvent::ConnectionState(state) => {
                debug!(state = %state, "Peer connection state changed");
                self.debug_log
                    .push(format!("Connection state changed: {state}"));
            }
        }
    }

    fn on_session_created(&mut self, defaults: SessionDefaults) {
        if let Some(id) = &defaults.id {
            self.debug_log.push(format!("Session id: {id}"));
        }

        let mut adopted_voice = None;
        if self.session.voice.trim().is_empty() {
            if let Some(voice) = defaults.voice {
                self.session.voice = voice.clone();
                adopted_voice = Some(voice);
            }
        }

        let mut adopted_instructions = None;
        if self.config.variant.adopts_server_instructions() {
            let local = self.session.instructions.trim().to_string();
            match defaults.instructions {
                Some(server) if local.is_empty() => {
                    self.debug_log
                        .push(format!("Using default instructions from server: \"{server}\""));
                    self.session.instructions = server.clone();
                    adopted_instructions = Some(server);
                }
                _ if !local.is_empty() => {
                    let message = format!("Keeping user-provided instructions: \"{local}\"");
                    self.debug_log.push(message);
                }
                _ => {}
            }
        }

        if adopted_voice.is_some() || adopted_instructions.is_some() {
            self.emit(Effect::SessionAdopted {
                voice: adopted_voice,
                instructions: adopted_instructions,
            });
        }

        if self.config.variant.auto_updates_session() {
            self.auto_update_at = Some(Instant::now() + self.config.auto_update_delay);
            self.debug_log.push(format!(
                "Scheduling automatic session update in {}ms",
                self.config.auto_update_delay.as_millis()
            ));
        }
    }

    fn on_session_updated(&mut self, defaults: SessionDefaults) {
        if let Some(voice) = &defaults.voice {
            self.session.voice = voice.clone();
            self.debug_log.push(format!("Voice model updated to: {voice}"));
        }
        if let Some(instructions) = &defaults.instructions {
            self.session.instructions = instructions.clone();
            self.debug_log
                .push(format!("Instructions updated to: \"{instructions}\""));
        }
        if let Some(modalities) = defaults.modalities.clone().filter(|m| !m.is_empty()) {
            self.session.modalities = modalities;
        }
        if defaults.voice.is_some() || defaults.instructions.is_some() {
            self.emit(Effect::SessionAdopted {
                voice: defaults.voice,
                instructions: defaults.instructions,
            });
        }

        if self.session.state == ConnectionState::Updating {
            self.update_deadline = None;
            self.set_state(ConnectionState::DataChannelOpen);
        }
    }

    /// Send a user text message and ask for a response.
    ///
    /// Blank text is ignored.
    pub async fn send_message(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let result = self.try_send_message(text).await;
        if let Err(error) = &result {
            self.report(error);
        }
        result
    }

    async fn try_send_message(&mut self, text: &str) -> Result<()> {
        self.ensure_channel_ready()?;
        if self.session.modalities.is_empty() {
            return Err(empty_modalities());
        }
        let modalities = self.session.modalities.clone();

        self.send_event(&ClientEvent::user_message(text))?;
        self.emit(Effect::Message(ChatMessage::user_text(text)));

        tokio::time::sleep(self.config.message_gap).await;
        self.ensure_channel_ready()?;
        self.send_event(&ClientEvent::response(modalities))?;
        Ok(())
    }

    /// Ask the server to change voice, instructions and modalities.
    ///
    /// The state stays `Updating` until `session.updated` arrives or the
    /// update timeout expires.
    pub fn update_session(&mut self, update: SessionUpdate) -> Result<()> {
        let result = self.try_update_session(update);
        if let Err(error) = &result {
            self.report(error);
        }
        result
    }

    fn try_update_session(&mut self, update: SessionUpdate) -> Result<()> {
        self.ensure_channel_ready()?;
        if self.session.state == ConnectionState::Updating {
            return Err(RealtimeError::InvalidState(
                "A session update is already in progress".into(),
            ));
        }
        if update.modalities.is_empty() {
            return Err(empty_modalities());
        }

        self.debug_log.push(format!(
            "Updating session: voice={}, modalities={}",
            update.voice, update.modalities
        ));
        let modalities = update.modalities.clone();
        self.send_event(&ClientEvent::session_update(update))?;
        self.session.modalities = modalities;

        self.update_deadline = Some(Instant::now() + self.config.update_timeout);
        self.set_state(ConnectionState::Updating);
        Ok(())
    }

    /// Tear the session down. Safe to call in any state.
    pub fn disconnect(&mut self) {
        let active = self.peer.is_some()
            || self.events.is_some()
            || self.session.state.is_live()
            || self.session.state == ConnectionState::Connecting;
        if !active {
            self.debug_log.push("Already disconnected");
            return;
        }
        self.teardown();
        self.set_state(ConnectionState::Disconnected);
        self.debug_log.push("Disconnected");
        info!("Realtime session disconnected");
    }

    fn teardown(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
        self.events = None;
        self.update_deadline = None;
        self.auto_update_at = None;
        self.dispatcher.reset();
        self.session.token = None;
        self.phase = None;
        if self.channel_ready {
            self.set_channel_ready(false);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.update_deadline, self.auto_update_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn fire_due_timers(&mut self, now: Instant) {
        if self.update_deadline.is_some_and(|at| at <= now) {
            self.update_deadline = None;
            if self.session.state == ConnectionState::Updating {
                self.set_state(ConnectionState::DataChannelOpen);
                let timeout = self.config.update_timeout.as_millis() as u64;
                self.report(&RealtimeError::UpdateTimeout(timeout));
            }
        }
        if self.auto_update_at.is_some_and(|at| at <= now) {
            self.auto_update_at = None;
            self.auto_update();
        }
    }

    /// Fire-and-forget `session.update` after `session.created`.
    fn auto_update(&mut self) {
        if !self.channel_ready {
            self.debug_log
                .push("Auto-update skipped: data channel not ready");
            return;
        }
        if self.session.modalities.is_empty() {
            self.debug_log
                .push("Auto-update aborted: No modalities selected");
            return;
        }

        let instructions = Some(self.session.instructions.trim())
            .filter(|text| !text.is_empty())
            .map(ToString::to_string);
        let update = SessionUpdate::builder()
            .voice(self.session.voice.clone())
            .maybe_instructions(instructions)
            .modalities(self.session.modalities.clone())
            .build();
        self.debug_log
            .push(format!("Auto-updating with voice: {}", update.voice));

        match self.send_event(&ClientEvent::session_update(update)) {
            Ok(()) => self.debug_log.push("Auto session update request sent"),
            Err(error) => {
                warn!(error = %error, "Automatic session update failed");
                self.debug_log
                    .push(format!("Error during auto-update: {error}"));
            }
        }
    }

    fn send_event(&mut self, event: &ClientEvent) -> Result<()> {
        let payload = event.to_json()?;
        self.peer_mut()?.send(&payload)?;
        self.debug_log.push(format!("Sent {}", event.event_type()));

        if matches!(event, ClientEvent::SessionUpdate { .. })
            && self.config.variant.shows_protocol_events()
        {
            let value = serde_json::to_value(event)?;
            self.emit(Effect::Message(ChatMessage::user_json(value)));
        }
        Ok(())
    }

    fn ensure_channel_ready(&self) -> Result<()> {
        if self.channel_ready && self.peer.is_some() {
            Ok(())
        } else {
            Err(RealtimeError::InvalidState("Data channel not ready".into()))
        }
    }

    fn peer_mut(&mut self) -> Result<&mut Box<dyn PeerConnection>> {
        self.peer
            .as_mut()
            .ok_or_else(|| RealtimeError::InvalidState("No active peer connection".into()))
    }

    fn emit(&mut self, effect: Effect) {
        if let Effect::Message(message) = &effect {
            self.messages.push(message.clone());
        }
        self.effects.push(effect);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.session.state == state {
            return;
        }
        debug!(from = %self.session.state, to = %state, "Connection state");
        self.session.state = state;
        self.emit(Effect::State(state));
        self.emit(Effect::Controls(self.controls()));
    }

    fn set_phase(&mut self, phase: ConnectionPhase) {
        self.phase = Some(phase);
        self.debug_log.push(format!("Connection phase: {phase}"));
        self.emit(Effect::Phase(phase));
    }

    fn set_channel_ready(&mut self, ready: bool) {
        self.channel_ready = ready;
        self.emit(Effect::ChannelReady(ready));
        self.emit(Effect::Controls(self.controls()));
    }

    fn report(&mut self, error: &RealtimeError) {
        let recovery = error.recovery_suggestion();
        warn!(category = ?error.category(), ?recovery, "{error}");
        self.debug_log
            .push(format!("Error: {error:?} (recovery: {recovery:?})"));
        self.emit(Effect::Notice(error.user_message()));
    }
}

fn empty_modalities() -> RealtimeError {
    RealtimeError::Validation(
        "Select at least one response modality (text or audio)".into(),
    )
}

async fn recv_opt(
    events: Option<&mut mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::transport::memory::{MemoryMedia, MemoryPeerConnector};

    fn idle_controller() -> SessionController {
        let (connector, _handle) = MemoryPeerConnector::new();
        SessionController::new(
            ClientConfig::default(),
            Arc::new(MemoryMedia::available()),
            Arc::new(connector),
        )
        .unwrap()
    }

    #[test]
    fn starts_idle_with_connect_enabled() {
        let controller = idle_controller();
        assert_eq!(controller.state(), ConnectionState::Idle);
        let controls = controller.controls();
        assert!(controls.connect);
        assert!(!controls.disconnect);
        assert!(!controls.message_input);
    }

    #[tokio::test]
    async fn blank_message_is_a_no_op() {
        let mut controller = idle_controller();
        controller.send_message("   ").await.unwrap();
        assert!(controller.drain_effects().is_empty());
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn message_before_channel_open_is_rejected() {
        let mut controller = idle_controller();
        let error = controller.send_message("hello").await.unwrap_err();
        assert!(matches!(error, RealtimeError::InvalidState(_)));
        assert_eq!(
            controller.drain_effects(),
            vec![Effect::Notice("Invalid state: Data channel not ready".into())]
        );
    }

    #[test]
    fn update_before_channel_open_is_rejected() {
        let mut controller = idle_controller();
        let update = SessionUpdate::builder()
            .voice("alloy")
            .modalities(ModalitySet::text())
            .build();
        assert!(controller.update_session(update).is_err());
        assert!(!controller.update_pending());
        assert_eq!(controller.state(), ConnectionState::Idle);
    }

    #[test]
    fn disconnect_from_idle_changes_nothing() {
        let mut controller = idle_controller();
        controller.disconnect();
        controller.disconnect();
        assert_eq!(controller.state(), ConnectionState::Idle);
        assert!(controller.drain_effects().is_empty());
        assert!(controller.debug_log().contains("Already disconnected"));
    }

    #[tokio::test]
    async fn step_returns_false_with_nothing_to_wait_for() {
        let mut controller = idle_controller();
        assert!(!controller.step().await);
        assert_eq!(controller.process_pending(), 0);
    }

    #[test]
    fn model_is_selectable_only_while_idle() {
        let mut controller = idle_controller();
        controller.set_model("gpt-4o-mini-realtime-preview").unwrap();
        assert_eq!(controller.session().model, "gpt-4o-mini-realtime-preview");
    }
}
