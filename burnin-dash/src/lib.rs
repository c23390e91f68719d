//! burnin-dash library - burn-in monitoring dashboard API
//!
//! Read side of the burn-in store plus the annotation workflow. Every
//! `/api/*` route runs behind the session middleware.

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod filters;
pub mod pagination;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Session signing secret (0 disables session checking)
    pub session_secret: i64,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, session_secret: i64) -> Self {
        Self {
            db,
            session_secret,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    // Protected routes (require a session)
    let protected = Router::new()
        .merge(api::session_routes())
        .merge(api::stats_routes())
        .merge(api::test_routes())
        .merge(api::annotation_routes())
        .merge(api::taxonomy_routes())
        .merge(api::analytics_routes())
        .merge(api::report_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ));

    // Public routes
    let public = api::health_routes();

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
