//! Seams for the capabilities a browser would supply: microphone capture and
//! the peer connection carrying the audio track and the data channel.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RealtimeError;

/// Label of the data channel the realtime endpoint expects.
pub const EVENTS_CHANNEL_LABEL: &str = "oai-events";

/// Local audio capture handle added to the peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub id: String,
}

/// Transport callbacks, queued in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ChannelOpen,
    Message(String),
    ChannelError(String),
    ChannelClosed,
    RemoteTrack,
    ConnectionState(String),
}

/// Source of local microphone audio.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Fails with [`RealtimeError::MediaAcquisition`] when no device is usable.
    async fn acquire_microphone(&self) -> Result<AudioTrack, RealtimeError>;
}

/// Factory for peer connections. Transport callbacks go to `events`.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn open(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn PeerConnection>, RealtimeError>;
}

/// A single peer connection with one outbound audio track and one data channel.
#[async_trait]
pub trait PeerConnection: Send {
    fn add_track(&mut self, track: AudioTrack) -> Result<(), RealtimeError>;

    fn create_data_channel(&mut self, label: &str) -> Result<(), RealtimeError>;

    /// Generate the local session description (SDP offer).
    async fn create_offer(&mut self) -> Result<String, RealtimeError>;

    async fn set_local_description(&mut self, sdp: &str) -> Result<(), RealtimeError>;

    async fn set_remote_description(&mut self, sdp: &str) -> Result<(), RealtimeError>;

    /// Send one text frame on the data channel.
    fn send(&mut self, text: &str) -> Result<(), RealtimeError>;

    /// Close the data channel and the connection. Safe to call repeatedly.
    fn close(&mut self);
}
