//! Transport connection lifecycle

use crate::error::ServerError;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Negotiating,
    Connected,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (New, Negotiating)
                | (Negotiating, Connected)
                | (Negotiating, Failed)
                | (Negotiating, Closing)
                | (Connected, Closing)
                | (Connected, Failed)
                | (Closing, Closed)
                | (Failed, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

/// Connection state shared between the registry and the socket task
#[derive(Debug)]
pub struct Connection {
    state: Mutex<ConnectionState>,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::New),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next`, returning the previous state
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState, ServerError> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(ServerError::InvalidConnectionTransition { from, to: next });
        }
        *state = next;
        debug!("Connection {:?} -> {:?}", from, next);
        Ok(from)
    }

    /// Force the connection to `Closed` from any state
    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Closed {
            debug!("Connection {:?} -> Closed", *state);
            *state = ConnectionState::Closed;
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
