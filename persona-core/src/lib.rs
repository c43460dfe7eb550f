//! persona-core: shared data model for the digital human session engine
//!
//! Holds the identifiers, segment types and error type that the speech
//! (`persona-spk`), avatar (`persona-me`) and server crates exchange.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    AudioFormat, AudioSegment, Role, RunGuard, RunId, SessionId, TranscriptRecord,
    UtteranceSegment,
};
