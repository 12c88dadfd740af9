//! HTTP surface of the signaling service
//!
//! - `GET /ws` - WebSocket upgrade; one connection per endpoint
//! - `GET /status` - Endpoint and pairing counts
//! - `GET /health` - Liveness probe
//! - `GET /metrics` - Counters since startup

pub mod ws;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::coordinator::{SessionCoordinator, StatusSnapshot};
use crate::metrics::MetricsSnapshot;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session coordinator
    pub coordinator: Arc<SessionCoordinator>,
    /// Service configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(coordinator: Arc<SessionCoordinator>, config: Arc<Config>) -> Self {
        Self {
            coordinator,
            config,
        }
    }
}

/// Build the HTTP router
pub fn build_router(state: AppState) -> Router {
    // Phones load the page from other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Seconds since the unix epoch
    pub timestamp: f64,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
    })
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.coordinator.status())
}

async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.coordinator.metrics().snapshot())
}
