//! Frame clock and audio pacing
//!
//! Each tick takes exactly one frame period worth of audio from the
//! playing segment, or silence when nothing is playing. The last chunk of a
//! segment is zero-padded so chunk duration never varies. Chunks wait for
//! the render/send path in a bounded buffer that drops the oldest entry
//! instead of blocking the clock.

use crate::error::AvatarError;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use persona_core::{AudioFormat, AudioSegment, RunId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// One frame period of audio paired with the request for its video frame
#[derive(Debug, Clone)]
pub struct FrameChunk {
    pub tick: u64,
    /// Run of the segment this audio came from; `None` for idle silence
    pub run: Option<RunId>,
    pub sequence: Option<u64>,
    pub audio: Bytes,
    pub is_silence: bool,
    /// Last chunk of its segment
    pub ends_segment: bool,
}

impl FrameChunk {
    /// Replace the audio with silence of the same length and detach it from its run
    pub fn mute(&mut self) {
        self.audio = Bytes::from(vec![0u8; self.audio.len()]);
        self.run = None;
        self.sequence = None;
        self.is_silence = true;
    }
}

/// The segment currently playing and how far into it playback is
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    current: Option<AudioSegment>,
    offset: usize,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, segment: AudioSegment) {
        self.current = Some(segment);
        self.offset = 0;
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.current.as_ref().map(|s| s.run)
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.offset = 0;
    }

    /// Bytes of the current segment not yet played
    pub fn remaining(&self) -> usize {
        self.current
            .as_ref()
            .map_or(0, |s| s.audio.len().saturating_sub(self.offset))
    }
}

pub struct FrameClock {
    period: Duration,
    chunk_bytes: usize,
    silence: Bytes,
    ticks: u64,
}

impl FrameClock {
    pub fn new(frame_rate: u32, format: &AudioFormat) -> Result<Self, AvatarError> {
        if frame_rate == 0 {
            return Err(AvatarError::Config("Frame rate must be greater than 0".to_string()));
        }
        let period = Duration::from_secs(1) / frame_rate;
        let chunk_bytes = format.bytes_for(period);
        if chunk_bytes == 0 {
            return Err(AvatarError::Config(format!(
                "Frame rate {} too high for {} Hz audio",
                frame_rate, format.sample_rate
            )));
        }

        Ok(Self {
            period,
            chunk_bytes,
            silence: Bytes::from(vec![0u8; chunk_bytes]),
            ticks: 0,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Ticks emitted so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Produce the next chunk from `playback`
    pub fn tick(&mut self, playback: &mut PlaybackQueue) -> FrameChunk {
        let tick = self.ticks;
        self.ticks += 1;

        let Some(segment) = playback.current.as_ref() else {
            return FrameChunk {
                tick,
                run: None,
                sequence: None,
                audio: self.silence.clone(),
                is_silence: true,
                ends_segment: false,
            };
        };

        let start = playback.offset.min(segment.audio.len());
        let end = (start + self.chunk_bytes).min(segment.audio.len());
        let audio = if end - start == self.chunk_bytes {
            segment.audio.slice(start..end)
        } else {
            let mut padded = BytesMut::zeroed(self.chunk_bytes);
            padded[..end - start].copy_from_slice(&segment.audio[start..end]);
            padded.freeze()
        };

        let chunk = FrameChunk {
            tick,
            run: Some(segment.run),
            sequence: Some(segment.sequence),
            audio,
            is_silence: segment.silent,
            ends_segment: end >= segment.audio.len(),
        };

        playback.offset = end;
        if chunk.ends_segment {
            playback.clear();
        }
        chunk
    }
}

/// Bounded hand-off between the clock and the render/send task
pub struct FrameBuffer {
    chunks: Mutex<VecDeque<FrameChunk>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a chunk without waiting. Returns true if the oldest chunk was dropped to make room.
    pub fn push(&self, chunk: FrameChunk) -> bool {
        let dropped = {
            let mut chunks = self.chunks.lock();
            let dropped = if chunks.len() >= self.capacity {
                chunks.pop_front();
                true
            } else {
                false
            };
            chunks.push_back(chunk);
            dropped
        };
        if dropped {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        dropped
    }

    /// Wait for the next chunk; `None` once closed and empty.
    ///
    /// Single consumer only.
    pub async fn pop(&self) -> Option<FrameChunk> {
        loop {
            if let Some(chunk) = self.chunks.lock().pop_front() {
                return Some(chunk);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
