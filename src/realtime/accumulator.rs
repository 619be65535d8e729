//! Reassembles streamed text deltas into complete utterances.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use uuid::Uuid;

/// Which stream an utterance comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UtteranceKind {
    ResponseText,
    AudioTranscript,
}

/// A streamed utterance, open while deltas arrive and complete once logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub id: Uuid,
    pub kind: UtteranceKind,
    pub text: String,
    pub chunks: usize,
    pub is_complete: bool,
    pub started_at: DateTime<Utc>,
}

impl Utterance {
    fn open(kind: UtteranceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            text: String::new(),
            chunks: 0,
            is_complete: false,
            started_at: Utc::now(),
        }
    }
}

/// One open slot per [`UtteranceKind`] plus the ordered log of finished ones.
#[derive(Debug, Default)]
pub struct Accumulator {
    response_text: Option<Utterance>,
    audio_transcript: Option<Utterance>,
    log: Vec<Utterance>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: UtteranceKind) -> &mut Option<Utterance> {
        match kind {
            UtteranceKind::ResponseText => &mut self.response_text,
            UtteranceKind::AudioTranscript => &mut self.audio_transcript,
        }
    }

    /// Open an empty utterance of `kind` unless one is already open.
    pub fn begin_if_needed(&mut self, kind: UtteranceKind) -> &mut Utterance {
        self.slot(kind).get_or_insert_with(|| Utterance::open(kind))
    }

    /// Append a delta to the open utterance, opening one first if needed.
    pub fn append(&mut self, kind: UtteranceKind, delta: &str) -> &Utterance {
        let utterance = self.begin_if_needed(kind);
        utterance.text.push_str(delta);
        utterance.chunks += 1;
        utterance
    }

    /// Close the open utterance of `kind` and move it into the log.
    pub fn complete(&mut self, kind: UtteranceKind) -> Option<&Utterance> {
        let mut utterance = self.slot(kind).take()?;
        utterance.is_complete = true;
        self.log.push(utterance);
        self.log.last()
    }

    /// Handle a terminal `done` event.
    ///
    /// Accumulated deltas win over the payload so a full-text `done` never
    /// duplicates what the deltas already delivered. With nothing open, the
    /// payload becomes a single-shot utterance.
    pub fn finish(&mut self, kind: UtteranceKind, payload: Option<&str>) -> Option<&Utterance> {
        if self.slot(kind).is_some() {
            return self.complete(kind);
        }
        let text = payload?;
        let mut utterance = Utterance::open(kind);
        utterance.text.push_str(text);
        utterance.chunks = 1;
        utterance.is_complete = true;
        self.log.push(utterance);
        self.log.last()
    }

    pub fn current(&self, kind: UtteranceKind) -> Option<&Utterance> {
        match kind {
            UtteranceKind::ResponseText => self.response_text.as_ref(),
            UtteranceKind::AudioTranscript => self.audio_transcript.as_ref(),
        }
    }

    pub fn is_open(&self, kind: UtteranceKind) -> bool {
        self.current(kind).is_some()
    }

    /// Finished utterances in completion order.
    pub fn log(&self) -> &[Utterance] {
        &self.log
    }

    /// Finished utterances of one kind.
    pub fn completed(&self, kind: UtteranceKind) -> impl Iterator<Item = &Utterance> {
        self.log.iter().filter(move |u| u.kind == kind)
    }

    /// Drop any open utterances; the finished log is kept.
    pub fn reset(&mut self) {
        self.response_text = None;
        self.audio_transcript = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(acc: &Accumulator) -> Vec<&str> {
        acc.log().iter().map(|u| u.text.as_str()).collect()
    }

    #[test]
    fn deltas_concatenate_in_arrival_order() {
        let mut acc = Accumulator::new();
        for delta in ["The ", "quick ", "brown ", "fox"] {
            acc.append(UtteranceKind::ResponseText, delta);
        }
        let done = acc.finish(UtteranceKind::ResponseText, None).cloned().unwrap();
        assert_eq!(done.text, "The quick brown fox");
        assert_eq!(done.chunks, 4);
        assert!(done.is_complete);
    }

    #[test]
    fn done_payload_does_not_duplicate_accumulated_text() {
        let mut acc = Accumulator::new();
        acc.append(UtteranceKind::ResponseText, "Hel");
        acc.append(UtteranceKind::ResponseText, "lo");
        acc.finish(UtteranceKind::ResponseText, Some("Hello"));
        assert_eq!(texts(&acc), vec!["Hello"]);
    }

    #[test]
    fn done_without_delta_is_single_shot() {
        let mut acc = Accumulator::new();
        let done = acc
            .finish(UtteranceKind::AudioTranscript, Some("Bonjour"))
            .cloned()
            .unwrap();
        assert_eq!(done.text, "Bonjour");
        assert_eq!(done.chunks, 1);
        assert!(!acc.is_open(UtteranceKind::AudioTranscript));
    }

    #[test]
    fn done_without_delta_or_payload_logs_nothing() {
        let mut acc = Accumulator::new();
        assert!(acc.finish(UtteranceKind::ResponseText, None).is_none());
        assert!(acc.complete(UtteranceKind::ResponseText).is_none());
        assert!(acc.log().is_empty());
    }

    #[test]
    fn next_delta_after_complete_starts_fresh() {
        let mut acc = Accumulator::new();
        acc.append(UtteranceKind::ResponseText, "first");
        acc.complete(UtteranceKind::ResponseText);
        let second = acc.append(UtteranceKind::ResponseText, "second");
        assert_eq!(second.text, "second");
        assert_eq!(second.chunks, 1);
        acc.complete(UtteranceKind::ResponseText);
        assert_eq!(texts(&acc), vec!["first", "second"]);
    }

    #[test]
    fn empty_delta_counts_as_chunk_without_content() {
        let mut acc = Accumulator::new();
        acc.append(UtteranceKind::ResponseText, "a");
        let current = acc.append(UtteranceKind::ResponseText, "");
        assert_eq!(current.text, "a");
        assert_eq!(current.chunks, 2);
    }

    #[test]
    fn kinds_do_not_cross_talk() {
        let mut acc = Accumulator::new();
        acc.append(UtteranceKind::ResponseText, "text-1 ");
        acc.append(UtteranceKind::AudioTranscript, "voice-1 ");
        acc.append(UtteranceKind::ResponseText, "text-2");
        acc.append(UtteranceKind::AudioTranscript, "voice-2");
        acc.complete(UtteranceKind::AudioTranscript);
        assert_eq!(
            acc.current(UtteranceKind::ResponseText).map(|u| u.text.as_str()),
            Some("text-1 text-2")
        );
        acc.complete(UtteranceKind::ResponseText);
        assert_eq!(texts(&acc), vec!["voice-1 voice-2", "text-1 text-2"]);
        assert_eq!(acc.completed(UtteranceKind::AudioTranscript).count(), 1);
    }

    #[test]
    fn reset_drops_open_slots_but_keeps_log() {
        let mut acc = Accumulator::new();
        acc.append(UtteranceKind::ResponseText, "kept");
        acc.complete(UtteranceKind::ResponseText);
        acc.append(UtteranceKind::ResponseText, "dropped");
        acc.reset();
        assert!(!acc.is_open(UtteranceKind::ResponseText));
        assert_eq!(texts(&acc), vec!["kept"]);
    }
}
