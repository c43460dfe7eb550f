//! persona-me: avatar side of the session engine
//!
//! Provides:
//! - The frame clock that paces audio into fixed-duration chunks
//! - Pluggable avatar renderers and a built-in viseme renderer
//! - The per-user session: state machine, turn pipeline, interruption
//!   and the decoupled render/send path
//! - Collaborator traits for text generation and transcript storage

pub mod error;
pub mod config;
pub mod frame_clock;
pub mod state;
pub mod renderer;
pub mod providers;
pub mod dialogue;
pub mod transport;
pub mod session;

pub use error::AvatarError;
pub use config::AvatarConfig;
pub use frame_clock::{FrameBuffer, FrameChunk, FrameClock, PlaybackQueue};
pub use state::{SessionEvent, SessionState};
pub use renderer::{AvatarHandle, AvatarRenderer, VideoFrame};
pub use providers::viseme::VisemeRenderer;
pub use dialogue::{
    EchoGenerator, GenerationRequest, MemoryTranscriptSink, TextGenerator, TracingTranscriptSink,
    TranscriptSink,
};
pub use transport::{ChannelSink, FrameSink, MediaFrame, Outbound, SessionUpdate};
pub use session::{Session, SessionCommand, SessionResources};
