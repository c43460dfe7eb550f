//! Error types for persona-me

use crate::state::{SessionEvent, SessionState};
use persona_core::Error as CoreError;
use persona_spk::SpeechError;
use thiserror::Error;

/// Avatar and session errors
#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Renderer error: {0}")]
    Renderer(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport lost")]
    TransportLost,

    #[error("Invalid transition: {event:?} in state {from:?}")]
    InvalidTransition { from: SessionState, event: SessionEvent },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Text generation error: {0}")]
    Generation(String),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<AvatarError> for CoreError {
    fn from(err: AvatarError) -> Self {
        match err {
            AvatarError::Config(msg) => CoreError::Configuration(msg),
            AvatarError::Transport(msg) => CoreError::Transport(msg),
            AvatarError::TransportLost => CoreError::Transport("transport lost".to_string()),
            AvatarError::Core(inner) => inner,
            other => CoreError::Avatar(other.to_string()),
        }
    }
}
