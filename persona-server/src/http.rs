//! HTTP routes

use crate::registry::{SessionInfo, SessionRegistry};
use crate::websocket::websocket_handler;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use persona_core::SessionId;
use persona_spk::{EngineAdapter, EngineHealthSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub adapter: Arc<EngineAdapter>,
    pub outbound_queue_depth: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, adapter: Arc<EngineAdapter>, outbound_queue_depth: usize) -> Self {
        Self {
            registry,
            adapter,
            outbound_queue_depth,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub engines: Vec<EngineHealthSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router with the session socket and status routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/sessions", get(sessions_handler))
        .route("/sessions/:id", get(session_handler).delete(close_session_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.adapter.is_healthy();
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sessions: state.registry.len(),
        engines: state.adapter.health_report(),
    };
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(response))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.registry.metrics().render_prometheus(),
    )
}

async fn sessions_handler(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.list();
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}

async fn session_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(id) = SessionId::parse(&id) else {
        return not_found(&id);
    };
    match state.registry.list().into_iter().find(|info| info.id == id) {
        Some(info) => (StatusCode::OK, Json(info)).into_response(),
        None => not_found(&id.to_string()),
    }
}

async fn close_session_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(session_id) = SessionId::parse(&id) else {
        return not_found(&id);
    };
    if state.registry.on_disconnect(session_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(&id)
    }
}

fn not_found(id: &str) -> axum::response::Response {
    let response = Json(ErrorResponse {
        error: format!("Session not found: {}", id),
    });
    (StatusCode::NOT_FOUND, response).into_response()
}
