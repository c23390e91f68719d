//! Session middleware for burnin-dash
//!
//! Verifies the `burnin_session` cookie set by the sign-in gateway and
//! attaches the resulting `SessionUser` as a request extension. Applied to
//! `/api/*` only; `/health` is public.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use burnin_common::auth::{now_unix, verify_token, SessionUser, SESSION_COOKIE};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// Session middleware
///
/// Secret 0 disables checking: every request runs as `Anonymous`.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = if state.session_secret == 0 {
        SessionUser::anonymous()
    } else {
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))?;

        verify_token(&token, state.session_secret, now_unix()).map_err(|e| {
            warn!(path = %request.uri().path(), "Session rejected: {}", e);
            ApiError::Unauthorized("Invalid or expired session".to_string())
        })?
    };

    debug!(user = %user.email, path = %request.uri().path(), "Authenticated request");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
