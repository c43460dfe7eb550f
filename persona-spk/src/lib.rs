//! persona-spk: speech side of the session engine
//!
//! Provides:
//! - An engine adapter over interchangeable synthesis/recognition backends,
//!   with per-engine health records, fallback ordering and call timeouts
//! - A streaming segmenter that turns incrementally generated text into
//!   speakable utterance segments
//! - A synthesis scheduler that bounds concurrent synthesis per session and
//!   releases audio strictly in sequence order

pub mod error;
pub mod config;
pub mod engines;
pub mod health;
pub mod cache;
pub mod adapter;
pub mod segmenter;
pub mod reorder;
pub mod scheduler;

pub use error::SpeechError;
pub use config::{
    AdapterConfig, EngineBackend, EngineSpec, SchedulerConfig, SegmenterConfig, SpeechConfig,
    VoiceConfig,
};
pub use engines::{AsrEngine, TtsEngine};
pub use health::{EngineHealth, EngineHealthSnapshot, EngineKind, HealthPolicy, HealthStatus};
pub use adapter::{EngineAdapter, EngineAdapterBuilder};
pub use segmenter::{segment_stream, Segmenter};
pub use reorder::ReorderBuffer;
pub use scheduler::{SchedulerReport, SynthesisScheduler};
