//! Health check and current-user endpoints

use axum::{extract::State, routing::get, Extension, Json, Router};
use burnin_common::auth::SessionUser;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database does not answer
    pub status: String,
    /// Module name ("burnin-dash")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
}

/// GET /health
///
/// Does NOT require a session.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("Health check database probe failed: {}", e);
            "degraded"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "burnin-dash".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
    })
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: SessionUser,
    /// False when the shared secret is 0 and everyone is Anonymous
    pub auth_enabled: bool,
}

/// GET /api/me
pub async fn current_user(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Json<MeResponse> {
    Json(MeResponse {
        user,
        auth_enabled: state.session_secret != 0,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Build session routes (protected)
pub fn session_routes() -> Router<AppState> {
    Router::new().route("/api/me", get(current_user))
}
