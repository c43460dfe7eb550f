//! Session registry
//!
//! Creates a session for each negotiated connection, routes control
//! messages to it and tears it down on disconnect, idleness or shutdown.
//! Lookups, inserts and removals come from independent socket tasks.

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionState};
use crate::error::{Result, ServerError};
use crate::metrics::Metrics;
use crate::negotiator::Negotiator;
use crate::protocol::ControlMessage;
use dashmap::DashMap;
use persona_core::SessionId;
use persona_me::{FrameSink, Session, SessionCommand, SessionResources, SessionState};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct SessionEntry {
    session: Arc<Session>,
    connection: Arc<Connection>,
    /// Held for the session's lifetime; dropping it frees the slot
    _slot: OwnedSemaphorePermit,
}

/// Snapshot of one live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub connection: ConnectionState,
    pub idle_secs: u64,
    pub frames_dropped: u64,
}

pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    slots: Arc<Semaphore>,
    resources: SessionResources,
    negotiator: Arc<dyn Negotiator>,
    config: ServerConfig,
    metrics: Arc<Metrics>,
}

impl SessionRegistry {
    pub fn new(
        resources: SessionResources,
        negotiator: Arc<dyn Negotiator>,
        config: ServerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            slots: Arc::new(Semaphore::new(config.max_sessions)),
            resources,
            negotiator,
            config,
            metrics,
        }
    }

    pub fn resources(&self) -> &SessionResources {
        &self.resources
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Negotiate a new connection and start its session
    pub async fn on_connect(&self, offer: &str, sink: Arc<dyn FrameSink>) -> Result<(String, SessionId)> {
        let slot = match self.slots.clone().try_acquire_owned() {
            Ok(slot) => slot,
            Err(_) => {
                self.metrics.session_rejected();
                warn!("Refusing connection: {} sessions open", self.config.max_sessions);
                return Err(ServerError::Capacity(self.config.max_sessions));
            }
        };

        let connection = Arc::new(Connection::new());
        connection.transition(ConnectionState::Negotiating)?;

        let answer = match self.negotiator.negotiate(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                connection.transition(ConnectionState::Failed)?;
                self.metrics.session_rejected();
                warn!("Negotiation with {} failed: {}", self.negotiator.name(), e);
                return Err(e);
            }
        };

        let id = SessionId::new();
        let session = match Session::start(id, self.resources.clone(), sink).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                connection.transition(ConnectionState::Failed)?;
                self.metrics.session_rejected();
                warn!(session = %id, "Session failed to start: {}", e);
                return Err(e.into());
            }
        };

        connection.transition(ConnectionState::Connected)?;
        self.sessions.insert(
            id,
            SessionEntry {
                session,
                connection,
                _slot: slot,
            },
        );
        self.metrics.session_opened();
        info!(session = %id, "Connected ({} sessions)", self.sessions.len());
        Ok((answer, id))
    }

    /// Route a control message to its session
    pub async fn on_control_message(&self, id: SessionId, message: ControlMessage) -> Result<()> {
        let command = match message.into_command() {
            Ok(Some(command)) => command,
            Ok(None) => {
                self.metrics.control_message(true);
                return Err(ServerError::MalformedControlMessage(
                    "Session already negotiated".to_string(),
                ));
            }
            Err(e) => {
                self.metrics.control_message(true);
                return Err(e);
            }
        };
        self.metrics.control_message(false);
        self.send_command(id, command).await
    }

    pub async fn send_command(&self, id: SessionId, command: SessionCommand) -> Result<()> {
        let session = self.get(id).ok_or(ServerError::SessionNotFound(id))?;
        session.send(command).await?;
        Ok(())
    }

    /// Tear down a session; returns false if it was already gone
    pub async fn on_disconnect(&self, id: SessionId) -> bool {
        let Some((_, entry)) = self.sessions.remove(&id) else {
            debug!(session = %id, "Disconnect for unknown session");
            return false;
        };

        if let Err(e) = entry.connection.transition(ConnectionState::Closing) {
            debug!(session = %id, "{}", e);
        }
        entry.session.close().await;
        entry.connection.close();
        self.metrics.session_closed();
        info!(session = %id, "Disconnected ({} sessions)", self.sessions.len());
        true
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| entry.session.clone())
    }

    pub fn connection_state(&self, id: SessionId) -> Option<ConnectionState> {
        self.sessions.get(&id).map(|entry| entry.connection.state())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| SessionInfo {
                id: *entry.key(),
                state: entry.session.state(),
                connection: entry.connection.state(),
                idle_secs: entry.session.idle_for().as_secs(),
                frames_dropped: entry.session.frames_dropped(),
            })
            .collect();
        sessions.sort_by_key(|info| info.id);
        sessions
    }

    /// Tear down sessions whose transport is gone or that sat idle past the timeout.
    /// A session counts as idle whenever no turn is in flight, including an
    /// open recording that stopped receiving audio.
    pub async fn reap(&self) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                let session = &entry.session;
                session.is_closed()
                    || (!session.state().is_busy() && session.idle_for() >= idle_timeout)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut reaped = 0;
        for id in expired {
            debug!(session = %id, "Reaping session");
            if self.on_disconnect(id).await {
                reaped += 1;
            }
        }
        reaped
    }

    pub fn spawn_reaper(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.reap_interval());
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let reaped = self.reap().await;
                        if reaped > 0 {
                            info!("Reaped {} sessions", reaped);
                        }
                    }
                }
            }
        })
    }

    pub async fn shutdown_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        info!("Closing {} sessions", ids.len());
        for id in ids {
            self.on_disconnect(id).await;
        }
    }
}
