//! persona-server: session registry and transport for the session engine
//!
//! Owns the process-level pieces: the registry of live sessions and their
//! connection states, the WebSocket control/media protocol, HTTP status
//! routes and configuration loading.

pub mod error;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod negotiator;
pub mod metrics;
pub mod registry;
pub mod http;
pub mod websocket;

pub use error::{Result, ServerError};
pub use config::{ConfigError, PersonaConfig, ServerConfig};
pub use connection::{Connection, ConnectionState};
pub use protocol::{ControlMessage, ServerEvent};
pub use negotiator::{LoopbackNegotiator, Negotiator};
pub use crate::metrics::Metrics;
pub use registry::{SessionInfo, SessionRegistry};
pub use http::{create_router, AppState};
