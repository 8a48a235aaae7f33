//! Status Routes
//!
//! Health checks.
//!
//! Routes:
//! - GET /health - Liveness plus a database ping (503 when the database is unreachable)

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db;
use crate::AppState;

static STARTUP_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize startup time. Call this once at server start.
pub fn init_startup_time() {
    let _ = STARTUP_TIME.get_or_init(Instant::now);
}

/// Get uptime in seconds since server start.
fn get_uptime_seconds() -> u64 {
    STARTUP_TIME.get().map(|start| start.elapsed().as_secs()).unwrap_or(0)
}

/// Build status routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

// ============================================================================
// Response Types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub database: DependencyCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check.
///
/// GET /health
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = check_database(&state).await;
    let status = database.status;

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: get_uptime_seconds(),
        timestamp: Utc::now(),
        database,
    };

    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (code, Json(response))
}

/// Check database connectivity.
async fn check_database(state: &AppState) -> DependencyCheck {
    let start = Instant::now();
    let result = db::health_check(&state.db).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(()) => DependencyCheck {
            status: HealthStatus::Healthy,
            latency_ms,
            message: None,
        },
        Err(e) => DependencyCheck {
            status: HealthStatus::Unhealthy,
            latency_ms,
            message: Some(e.to_string()),
        },
    }
}
