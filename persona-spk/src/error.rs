//! Error types for persona-spk

use persona_core::Error as CoreError;
use std::time::Duration;
use thiserror::Error;

/// Speech engine errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Engine '{engine}' failed: {reason}")]
    EngineFailure { engine: String, reason: String },

    #[error("Engine '{engine}' timed out after {after:?}")]
    Timeout { engine: String, after: Duration },

    #[error("All engines failed (attempted: {})", attempted.join(", "))]
    EngineExhausted { attempted: Vec<String> },

    #[error("No engines registered for {0}")]
    NoEngines(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeechError {
    pub fn engine(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        SpeechError::EngineFailure {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure should count against the engine's health record
    pub fn is_engine_fault(&self) -> bool {
        matches!(
            self,
            SpeechError::EngineFailure { .. } | SpeechError::Timeout { .. } | SpeechError::Io(_)
        )
    }
}

impl From<SpeechError> for CoreError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::Config(msg) => CoreError::Configuration(msg),
            SpeechError::InvalidInput(msg) => CoreError::Validation(msg),
            other => CoreError::Engine(other.to_string()),
        }
    }
}
