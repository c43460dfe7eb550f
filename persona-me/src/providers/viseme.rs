//! Viseme renderer
//!
//! Draws a mouth whose opening follows the loudness of each audio chunk.
//! Needs no model or GPU, so it backs local runs and tests.

use crate::error::AvatarError;
use crate::frame_clock::FrameChunk;
use crate::renderer::{AvatarHandle, AvatarRenderer, VideoFrame};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// RMS at which the mouth is fully open
const FULL_OPEN_RMS: f32 = 6_000.0;
/// Fraction of the previous opening kept per frame when the mouth closes
const DECAY: f32 = 0.6;

pub struct VisemeRenderer {
    width: u32,
    height: u32,
    max_handles: usize,
    next_id: AtomicU64,
    /// Smoothed mouth opening per live handle
    openness: Mutex<HashMap<u64, f32>>,
}

impl VisemeRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_capacity(width, height, usize::MAX)
    }

    /// Renderer that refuses more than `max_handles` concurrent avatars
    pub fn with_capacity(width: u32, height: u32, max_handles: usize) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            max_handles,
            next_id: AtomicU64::new(1),
            openness: Mutex::new(HashMap::new()),
        }
    }

    pub fn active_handles(&self) -> usize {
        self.openness.lock().len()
    }

    /// Root mean square of s16le samples, mapped to 0.0..=1.0
    pub fn loudness(audio: &[u8]) -> f32 {
        let samples = audio.len() / 2;
        if samples == 0 {
            return 0.0;
        }
        let sum: f64 = audio
            .chunks_exact(2)
            .map(|pair| {
                let s = i16::from_le_bytes([pair[0], pair[1]]) as f64;
                s * s
            })
            .sum();
        let rms = (sum / samples as f64).sqrt() as f32;
        (rms / FULL_OPEN_RMS).min(1.0)
    }

    fn draw(&self, openness: f32) -> Bytes {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut pixels = vec![0u8; w * h];
        let cx = (w as f32 - 1.0) / 2.0;
        let cy = (h as f32 - 1.0) / 2.0;
        let rx = (w as f32 * 0.4).max(1.0);
        // A closed mouth still shows as a thin line
        let ry = (h as f32 * 0.45 * openness).max(0.5);

        for y in 0..h {
            for x in 0..w {
                let dx = (x as f32 - cx) / rx;
                let dy = (y as f32 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 {
                    pixels[y * w + x] = 255;
                }
            }
        }
        Bytes::from(pixels)
    }
}

#[async_trait]
impl AvatarRenderer for VisemeRenderer {
    async fn acquire(&self, avatar_id: Option<&str>) -> Result<AvatarHandle, AvatarError> {
        let mut openness = self.openness.lock();
        if openness.len() >= self.max_handles {
            return Err(AvatarError::Renderer(format!(
                "No free avatar instances (max {})",
                self.max_handles
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        openness.insert(id, 0.0);
        debug!("Acquired avatar handle {}", id);
        Ok(AvatarHandle::new(id, avatar_id.unwrap_or("viseme")))
    }

    async fn render_frame(&self, handle: &AvatarHandle, chunk: &FrameChunk) -> Result<VideoFrame, AvatarError> {
        let target = if chunk.is_silence { 0.0 } else { Self::loudness(&chunk.audio) };
        let level = {
            let mut openness = self.openness.lock();
            let previous = openness
                .get_mut(&handle.id())
                .ok_or_else(|| AvatarError::Renderer(format!("Unknown avatar handle {}", handle.id())))?;
            *previous = if target >= *previous { target } else { *previous * DECAY + target * (1.0 - DECAY) };
            *previous
        };

        Ok(VideoFrame {
            width: self.width,
            height: self.height,
            data: self.draw(level),
        })
    }

    async fn release(&self, handle: AvatarHandle) -> Result<(), AvatarError> {
        if self.openness.lock().remove(&handle.id()).is_none() {
            return Err(AvatarError::Renderer(format!("Avatar handle {} already released", handle.id())));
        }
        debug!("Released avatar handle {}", handle.id());
        Ok(())
    }

    fn name(&self) -> &str {
        "viseme"
    }
}
