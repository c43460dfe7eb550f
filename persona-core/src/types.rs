//! Shared identifiers and segment types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Opaque session identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation run identifier. Increases monotonically within a session;
/// every new turn and every interrupt moves to a fresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Shared view of a session's current generation run.
///
/// Cloned into every task that produces audio for the session. Work tagged
/// with a run that is no longer current must be discarded.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    current: Arc<AtomicU64>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RunId {
        RunId(self.current.load(Ordering::Acquire))
    }

    /// Move to a new run, invalidating everything tagged with older runs
    pub fn advance(&self) -> RunId {
        RunId(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, run: RunId) -> bool {
        self.current() == run
    }
}

/// PCM layout used on every audio path: signed 16-bit little endian, interleaved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Size of one sample across all channels
    pub fn frame_bytes(&self) -> usize {
        Self::BYTES_PER_SAMPLE * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_bytes()
    }

    /// Playback duration of `len` bytes of PCM
    pub fn duration_of(&self, len: usize) -> Duration {
        let bps = self.bytes_per_second();
        if bps == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((len as u128 * 1_000_000_000 / bps as u128) as u64)
    }

    /// Number of bytes covering `duration`, rounded down to whole sample frames
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let raw = (self.bytes_per_second() as u128 * duration.as_nanos() / 1_000_000_000) as usize;
        raw - raw % self.frame_bytes().max(1)
    }

    pub fn silence(&self, duration: Duration) -> Bytes {
        Bytes::from(vec![0u8; self.bytes_for(duration)])
    }
}

/// A unit of generated text ready for synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtteranceSegment {
    /// Monotonic within one generation run, starting at 0
    pub sequence: u64,
    pub text: String,
    pub run: RunId,
}

/// Synthesized audio for one utterance segment
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub sequence: u64,
    pub run: RunId,
    pub audio: Bytes,
    pub duration: Duration,
    /// Set when synthesis failed and the segment carries silence instead
    pub silent: bool,
}

impl AudioSegment {
    pub fn new(sequence: u64, run: RunId, audio: Bytes, format: &AudioFormat) -> Self {
        let duration = format.duration_of(audio.len());
        Self {
            sequence,
            run,
            audio,
            duration,
            silent: false,
        }
    }

    pub fn silence(sequence: u64, run: RunId, duration: Duration, format: &AudioFormat) -> Self {
        let audio = format.silence(duration);
        Self {
            sequence,
            run,
            duration: format.duration_of(audio.len()),
            audio,
            silent: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Conversation record handed to external storage; never read back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub session_id: SessionId,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptRecord {
    pub fn new(session_id: SessionId, role: Role, text: impl Into<String>) -> Self {
        Self {
            session_id,
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
