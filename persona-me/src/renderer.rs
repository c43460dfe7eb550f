//! Avatar renderer interface
//!
//! A renderer turns audio chunks into video frames for one avatar. Each
//! session acquires exactly one handle when it starts and gives it back on
//! teardown; handles cannot be cloned.

use crate::error::AvatarError;
use crate::frame_clock::FrameChunk;
use async_trait::async_trait;
use bytes::Bytes;

/// Exclusive claim on a renderer-side avatar instance
#[derive(Debug)]
pub struct AvatarHandle {
    id: u64,
    avatar_id: String,
}

impl AvatarHandle {
    pub fn new(id: u64, avatar_id: impl Into<String>) -> Self {
        Self {
            id,
            avatar_id: avatar_id.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn avatar_id(&self) -> &str {
        &self.avatar_id
    }
}

/// One rendered frame, 8-bit grayscale unless the renderer documents otherwise
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl VideoFrame {
    /// Blank frame shown before the first successful render
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: Bytes::from(vec![0u8; (width * height) as usize]),
        }
    }
}

#[async_trait]
pub trait AvatarRenderer: Send + Sync {
    /// Claim an avatar instance for a new session
    async fn acquire(&self, avatar_id: Option<&str>) -> Result<AvatarHandle, AvatarError>;

    /// Render the frame that accompanies `chunk`
    async fn render_frame(&self, handle: &AvatarHandle, chunk: &FrameChunk) -> Result<VideoFrame, AvatarError>;

    /// Give the instance back; called once per handle
    async fn release(&self, handle: AvatarHandle) -> Result<(), AvatarError>;

    fn name(&self) -> &str;
}
