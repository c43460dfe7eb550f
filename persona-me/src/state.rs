//! Session state machine

use crate::error::AvatarError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// User started talking or typing
    UserInput,
    /// Input complete and handed to text generation
    InputCaptured,
    /// First audio of the current run reached playback
    AudioStarted,
    /// Playback queue empty and nothing more pending for the run
    PlaybackDrained,
    Interrupt,
    /// Return to idle after an interrupt or an abandoned input
    Reset,
}

impl SessionState {
    /// Apply `event`, returning the next state
    pub fn transition(self, event: SessionEvent) -> Result<SessionState, AvatarError> {
        use SessionEvent::*;
        use SessionState::*;

        let next = match (self, event) {
            (Idle, UserInput) => Listening,
            (Listening, InputCaptured) => Thinking,
            (Thinking, AudioStarted) => Speaking,
            (Speaking, PlaybackDrained) => Idle,
            // A turn that produced no audio at all
            (Thinking, PlaybackDrained) => Idle,
            (Thinking | Speaking, Interrupt) => Interrupted,
            (Interrupted, Reset) => Idle,
            (Listening, Reset) => Idle,
            (Thinking, Reset) => Idle,
            (from, event) => return Err(AvatarError::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// States in which new user input must interrupt the current turn first
    pub fn is_busy(self) -> bool {
        matches!(self, SessionState::Thinking | SessionState::Speaking)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Thinking => "thinking",
            SessionState::Speaking => "speaking",
            SessionState::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionEvent::*;
    use SessionState::*;

    #[test]
    fn test_full_turn() {
        let mut state = Idle;
        for event in [UserInput, InputCaptured, AudioStarted, PlaybackDrained] {
            state = state.transition(event).unwrap();
        }
        assert_eq!(state, Idle);
    }

    #[test]
    fn test_interrupt_from_thinking_and_speaking() {
        for from in [Thinking, Speaking] {
            let interrupted = from.transition(Interrupt).unwrap();
            assert_eq!(interrupted, Interrupted);
            assert_eq!(interrupted.transition(Reset).unwrap(), Idle);
        }
    }

    #[test]
    fn test_interrupt_rejected_when_not_busy() {
        for from in [Idle, Listening, Interrupted] {
            assert!(matches!(
                from.transition(Interrupt),
                Err(AvatarError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn test_speaking_requires_thinking() {
        assert!(Idle.transition(AudioStarted).is_err());
        assert!(Listening.transition(AudioStarted).is_err());
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Speaking).unwrap(), "\"speaking\"");
        assert_eq!(Thinking.to_string(), "thinking");
    }
}
