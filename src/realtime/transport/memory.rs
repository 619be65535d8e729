//! In-memory loopback transport.
//!
//! Stands in for a browser peer connection: the [`MemoryPeerHandle`] plays
//! the remote side, opening the channel, delivering frames and recording
//! everything the client sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{AudioTrack, MediaSource, PeerConnection, PeerConnector, TransportEvent};
use crate::error::RealtimeError;

/// Microphone that always succeeds, always fails, or never answers.
#[derive(Debug, Clone)]
pub struct MemoryMedia {
    denial: Option<String>,
    stalled: bool,
}

impl MemoryMedia {
    pub fn available() -> Self {
        Self {
            denial: None,
            stalled: false,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            denial: Some(reason.into()),
            stalled: false,
        }
    }

    /// A permission prompt nobody answers.
    pub fn stalled() -> Self {
        Self {
            denial: None,
            stalled: true,
        }
    }
}

#[async_trait]
impl MediaSource for MemoryMedia {
    async fn acquire_microphone(&self) -> Result<AudioTrack, RealtimeError> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        match &self.denial {
            Some(reason) => Err(RealtimeError::MediaAcquisition(reason.clone())),
            None => Ok(AudioTrack {
                id: format!("mic-{}", Uuid::new_v4().simple()),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    connections_opened: usize,
    tracks: Vec<AudioTrack>,
    channels: Vec<String>,
    local_description: Option<String>,
    remote_description: Option<String>,
    sent: Vec<String>,
    channel_open: bool,
    closed: bool,
    auto_open: bool,
    send_failure: Option<String>,
    remote_failure: Option<String>,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector producing [`MemoryPeer`]s that all share one remote handle.
#[derive(Debug, Clone)]
pub struct MemoryPeerConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryPeerConnector {
    pub fn new() -> (Self, MemoryPeerHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MemoryPeerHandle { shared },
        )
    }

    /// Open the data channel as soon as the remote description is applied.
    pub fn with_auto_open(self) -> Self {
        lock(&self.shared).auto_open = true;
        self
    }
}

#[async_trait]
impl PeerConnector for MemoryPeerConnector {
    async fn open(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PeerConnection>, RealtimeError> {
        let mut shared = lock(&self.shared);
        shared.events = Some(events);
        shared.connections_opened += 1;
        shared.tracks.clear();
        shared.channels.clear();
        shared.local_description = None;
        shared.remote_description = None;
        shared.channel_open = false;
        shared.closed = false;
        Ok(Box::new(MemoryPeer {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Client side of the loopback connection.
#[derive(Debug)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

#[async_trait]
impl PeerConnection for MemoryPeer {
    fn add_track(&mut self, track: AudioTrack) -> Result<(), RealtimeError> {
        lock(&self.shared).tracks.push(track);
        Ok(())
    }

    fn create_data_channel(&mut self, label: &str) -> Result<(), RealtimeError> {
        lock(&self.shared).channels.push(label.to_string());
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<String, RealtimeError> {
        Ok(format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n",
            Uuid::new_v4().as_u128() % 1_000_000_000
        ))
    }

    async fn set_local_description(&mut self, sdp: &str) -> Result<(), RealtimeError> {
        lock(&self.shared).local_description = Some(sdp.to_string());
        Ok(())
    }

    async fn set_remote_description(&mut self, sdp: &str) -> Result<(), RealtimeError> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = shared.remote_failure.clone() {
            return Err(RealtimeError::signaling(None, reason));
        }
        shared.remote_description = Some(sdp.to_string());
        if shared.auto_open {
            shared.channel_open = true;
            shared.emit(TransportEvent::ChannelOpen);
        }
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<(), RealtimeError> {
        let mut shared = lock(&self.shared);
        if shared.closed || !shared.channel_open {
            return Err(RealtimeError::Channel("Data channel is not open".into()));
        }
        if let Some(reason) = shared.send_failure.clone() {
            return Err(RealtimeError::Channel(reason));
        }
        shared.sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = lock(&self.shared);
        shared.channel_open = false;
        shared.closed = true;
    }
}

/// Remote side of the loopback connection, used to drive and observe a client.
#[derive(Debug, Clone)]
pub struct MemoryPeerHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryPeerHandle {
    pub fn open_channel(&self) {
        let mut shared = lock(&self.shared);
        shared.channel_open = true;
        shared.emit(TransportEvent::ChannelOpen);
    }

    /// Deliver one raw text frame to the client.
    pub fn deliver(&self, text: impl Into<String>) {
        lock(&self.shared).emit(TransportEvent::Message(text.into()));
    }

    pub fn deliver_json(&self, value: &Value) {
        self.deliver(value.to_string());
    }

    pub fn fail_channel(&self, reason: impl Into<String>) {
        lock(&self.shared).emit(TransportEvent::ChannelError(reason.into()));
    }

    pub fn close_channel(&self) {
        let mut shared = lock(&self.shared);
        shared.channel_open = false;
        shared.emit(TransportEvent::ChannelClosed);
    }

    pub fn emit(&self, event: TransportEvent) {
        lock(&self.shared).emit(event);
    }

    /// Make every subsequent `send` fail with a channel error.
    pub fn fail_sends(&self, reason: impl Into<String>) {
        lock(&self.shared).send_failure = Some(reason.into());
    }

    /// Make `set_remote_description` reject the answer.
    pub fn reject_remote_description(&self, reason: impl Into<String>) {
        lock(&self.shared).remote_failure = Some(reason.into());
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.shared).sent.clone()
    }

    /// Sent frames decoded as JSON; frames that are not JSON are skipped.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .filter_map(|value| value.get("type").and_then(Value::as_str).map(String::from))
            .collect()
    }

    pub fn tracks(&self) -> Vec<AudioTrack> {
        lock(&self.shared).tracks.clone()
    }

    pub fn channels(&self) -> Vec<String> {
        lock(&self.shared).channels.clone()
    }

    pub fn local_description(&self) -> Option<String> {
        lock(&self.shared).local_description.clone()
    }

    pub fn remote_description(&self) -> Option<String> {
        lock(&self.shared).remote_description.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }

    pub fn connections_opened(&self) -> usize {
        lock(&self.shared).connections_opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_requires_open_channel_and_records_frames() {
        let (connector, handle) = MemoryPeerConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut peer = connector.open(tx).await.unwrap();

        assert!(matches!(peer.send("early"), Err(RealtimeError::Channel(_))));

        handle.open_channel();
        assert_eq!(rx.recv().await, Some(TransportEvent::ChannelOpen));
        peer.send(r#"{"type":"response.create"}"#).unwrap();
        assert_eq!(handle.sent_types(), vec!["response.create"]);

        peer.close();
        peer.close();
        assert!(handle.is_closed());
        assert!(peer.send("late").is_err());
    }

    #[tokio::test]
    async fn auto_open_fires_when_answer_is_applied() {
        let (connector, handle) = MemoryPeerConnector::new();
        let connector = connector.with_auto_open();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut peer = connector.open(tx).await.unwrap();

        let offer = peer.create_offer().await.unwrap();
        assert!(offer.starts_with("v=0"));
        peer.set_remote_description("v=0 answer").await.unwrap();

        assert_eq!(rx.recv().await, Some(TransportEvent::ChannelOpen));
        assert_eq!(handle.remote_description().as_deref(), Some("v=0 answer"));
    }

    #[tokio::test]
    async fn denied_media_reports_reason() {
        let error = MemoryMedia::denied("Permission denied")
            .acquire_microphone()
            .await
            .unwrap_err();
        assert!(matches!(error, RealtimeError::MediaAcquisition(reason) if reason == "Permission denied"));
    }
}
