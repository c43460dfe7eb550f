//! Error types for persona-server

use crate::connection::ConnectionState;
use axum::http::StatusCode;
use persona_core::{Error as CoreError, SessionId};
use persona_me::AvatarError;
use persona_spk::SpeechError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Rejected with an error event; the session keeps running
    #[error("Malformed control message: {0}")]
    MalformedControlMessage(String),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session limit reached ({0})")]
    Capacity(usize),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Invalid connection transition: {from:?} -> {to:?}")]
    InvalidConnectionTransition { from: ConnectionState, to: ConnectionState },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Avatar error: {0}")]
    Avatar(#[from] AvatarError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::MalformedControlMessage(_) | ServerError::Negotiation(_) => StatusCode::BAD_REQUEST,
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidConnectionTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for error events
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::MalformedControlMessage(_) => "malformed_message",
            ServerError::SessionNotFound(_) => "session_not_found",
            ServerError::Capacity(_) => "capacity",
            ServerError::Negotiation(_) => "negotiation_failed",
            ServerError::InvalidConnectionTransition { .. } => "invalid_state",
            ServerError::Config(_) => "config",
            ServerError::Avatar(AvatarError::SessionClosed) => "session_closed",
            ServerError::Avatar(_) => "avatar",
            ServerError::Speech(_) => "speech",
            ServerError::Io(_) => "io",
        }
    }
}

impl From<ServerError> for CoreError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::MalformedControlMessage(msg) => CoreError::Validation(msg),
            ServerError::SessionNotFound(id) => CoreError::SessionNotFound(id.to_string()),
            ServerError::Capacity(max) => CoreError::Capacity(format!("max {} sessions", max)),
            ServerError::Config(msg) => CoreError::Configuration(msg),
            ServerError::Avatar(inner) => inner.into(),
            ServerError::Speech(inner) => inner.into(),
            ServerError::Io(inner) => CoreError::Io(inner),
            other => CoreError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
