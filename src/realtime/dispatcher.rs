//! Turns raw data-channel frames into effects, one frame at a time.

use serde_json::Value;

use super::accumulator::{Accumulator, UtteranceKind};
use super::debug_log::DebugLog;
use super::effects::{ChatMessage, Effect};
use super::events::{ServerEvent, SessionDefaults};
use crate::config::ClientVariant;
use crate::error::RealtimeError;

const PREVIEW_CHARS: usize = 100;

/// Session lifecycle events the controller acts on after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    Created(SessionDefaults),
    Updated(SessionDefaults),
}

#[derive(Debug, Default)]
pub struct DispatchOutput {
    pub effects: Vec<Effect>,
    pub signal: Option<SessionSignal>,
}

#[derive(Debug)]
pub struct EventDispatcher {
    accumulator: Accumulator,
    variant: ClientVariant,
}

impl EventDispatcher {
    pub fn new(variant: ClientVariant) -> Self {
        Self {
            accumulator: Accumulator::new(),
            variant,
        }
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Drop open utterances; finished ones stay in the log.
    pub fn reset(&mut self) {
        self.accumulator.reset();
    }

    /// Handle one raw frame. Never fails: a malformed frame becomes a notice.
    pub fn dispatch(&mut self, raw: &str, log: &mut DebugLog) -> DispatchOutput {
        log.push(format!("Received raw data: {raw}"));

        let event = match ServerEvent::parse(raw) {
            Ok(event) => event,
            Err(RealtimeError::Parse { message, raw }) => {
                log.push(format!("Error parsing event: {message}"));
                tracing::warn!(%message, "Dropping malformed realtime event");
                return DispatchOutput {
                    effects: vec![Effect::Notice(format!("[Parse Error] Raw data: {raw}"))],
                    signal: None,
                };
            }
            Err(other) => {
                log.push(format!("Error parsing event: {other}"));
                return DispatchOutput {
                    effects: vec![Effect::Notice(other.user_message())],
                    signal: None,
                };
            }
        };
        log.push(format!("Parsed event: {}", preview(raw)));

        let mut out = DispatchOutput::default();
        match event {
            ServerEvent::TextDelta { delta } => {
                log.push(format!("Received text delta: [{} chars]", delta.chars().count()));
                self.append(UtteranceKind::ResponseText, &delta, &mut out);
            }
            ServerEvent::TextDone { text } => {
                self.finish(UtteranceKind::ResponseText, text.as_deref(), &mut out);
            }
            ServerEvent::TranscriptDelta { delta } => {
                log.push(format!(
                    "Received transcript delta: [{} chars]",
                    delta.chars().count()
                ));
                self.append(UtteranceKind::AudioTranscript, &delta, &mut out);
            }
            ServerEvent::TranscriptDone { transcript } => {
                self.finish(UtteranceKind::AudioTranscript, transcript.as_deref(), &mut out);
            }
            ServerEvent::ResponseDone { payload } => {
                if let Some(utterance) = self.accumulator.complete(UtteranceKind::ResponseText) {
                    out.effects.push(Effect::Utterance(utterance.clone()));
                }
                log.push(format!("Response done: {payload}"));
                self.show(payload, &mut out);
            }
            ServerEvent::SessionCreated { session, payload } => {
                log.push("Session created");
                self.show(payload, &mut out);
                out.signal = Some(SessionSignal::Created(session));
            }
            ServerEvent::SessionUpdated { session, payload } => {
                log.push("Session update completed successfully");
                self.show(payload, &mut out);
                out.signal = Some(SessionSignal::Updated(session));
            }
            ServerEvent::Other { event_type, .. } => {
                tracing::trace!(event_type = %event_type, "Ignoring realtime event");
            }
        }
        out
    }

    fn append(&mut self, kind: UtteranceKind, delta: &str, out: &mut DispatchOutput) {
        let current = self.accumulator.append(kind, delta);
        out.effects.push(Effect::Partial {
            kind,
            text: current.text.clone(),
        });
    }

    fn finish(&mut self, kind: UtteranceKind, payload: Option<&str>, out: &mut DispatchOutput) {
        if let Some(utterance) = self.accumulator.finish(kind, payload) {
            out.effects.push(Effect::Utterance(utterance.clone()));
        }
    }

    fn show(&self, payload: Value, out: &mut DispatchOutput) {
        if self.variant.shows_protocol_events() {
            out.effects
                .push(Effect::Message(ChatMessage::assistant_json(payload)));
        }
    }
}

fn preview(raw: &str) -> String {
    if raw.chars().count() <= PREVIEW_CHARS {
        return raw.to_string();
    }
    let head: String = raw.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}
