//! Outbound path from a session to its connection

use crate::error::AvatarError;
use crate::frame_clock::FrameChunk;
use crate::renderer::VideoFrame;
use crate::state::SessionState;
use async_trait::async_trait;
use persona_core::TranscriptRecord;
use tokio::sync::mpsc;

/// One paced audio chunk with its rendered frame
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub chunk: FrameChunk,
    pub video: VideoFrame,
}

/// Non-media notifications for the client
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    State(SessionState),
    Transcript(TranscriptRecord),
    Error(String),
}

/// Where a session's output goes. Implemented by the transport layer.
///
/// Calls come from the session's single sender task, so implementations
/// may apply backpressure freely; the frame clock never waits on them.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_media(&self, frame: MediaFrame) -> Result<(), AvatarError>;

    async fn send_event(&self, update: SessionUpdate) -> Result<(), AvatarError>;
}

#[derive(Debug)]
pub enum Outbound {
    Media(MediaFrame),
    Update(SessionUpdate),
}

/// Sink backed by a bounded channel; a closed receiver means the transport is gone
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_media(&self, frame: MediaFrame) -> Result<(), AvatarError> {
        self.tx
            .send(Outbound::Media(frame))
            .await
            .map_err(|_| AvatarError::TransportLost)
    }

    async fn send_event(&self, update: SessionUpdate) -> Result<(), AvatarError> {
        self.tx
            .send(Outbound::Update(update))
            .await
            .map_err(|_| AvatarError::TransportLost)
    }
}
