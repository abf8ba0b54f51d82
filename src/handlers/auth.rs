use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::{
    error::{AppError, Result},
    middleware_layer::{auth::SESSION_COOKIE, rate_limit::ClientId},
    models::session::SessionData,
    services::rate_limit::{RateLimitStatus, format_remaining},
    state::AppState,
};

/// The request payload for admin login.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[garde(length(max = 1024))]
    pub password: String,
}

/// The response payload for login and token refresh.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    /// Unix milliseconds.
    pub expires_at: i64,
}

/// The response payload for logout.
#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// The response payload for session verification.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub authenticated: bool,
    /// Unix milliseconds.
    pub expires_at: i64,
    pub expiring_soon: bool,
}

/// Creates the session cookie carrying `token`.
fn create_session_cookie(token: String, max_age_secs: i64, production: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);

    cookie.set_http_only(true);
    if production {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Strict);
    cookie.set_max_age(Duration::seconds(max_age_secs));
    cookie.set_path("/");

    cookie
}

/// Issues a session and attaches it to the response cookies.
fn start_session(state: &AppState, cookies: &Cookies) -> Result<SessionData> {
    let (token, session) = state.sessions.issue()?;
    let cookie = create_session_cookie(
        token,
        state.sessions.duration().num_seconds(),
        state.config.production,
    );
    cookies.add(cookie);
    Ok(session)
}

/// The rejection for a blocked client, carrying only a wait estimate.
fn rate_limited(state: &AppState, status: &RateLimitStatus) -> AppError {
    let wait = status.blocked_until.unwrap_or(status.reset_at) - state.clock.now();
    AppError::RateLimited {
        retry_after: format_remaining(wait),
    }
}

/// Handles admin login.
///
/// Blocked clients are refused before the password is checked.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Extension(client): Extension<ClientId>,
    cookies: Cookies,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(payload) = payload.map_err(|e| {
        tracing::debug!("Rejected login body: {}", e);
        AppError::Validation("Invalid request body".to_string())
    })?;
    payload
        .validate()
        .map_err(|_| AppError::Validation("Password is too long".to_string()))?;

    let status = state.rate_limiter.check(&client.0).await?;
    if !status.allowed {
        return Err(rate_limited(&state, &status));
    }

    if !state.credentials.verify(&payload.password) {
        state.rate_limiter.record_failure(&client.0).await?;

        let after = state.rate_limiter.check(&client.0).await?;
        if !after.allowed {
            return Err(rate_limited(&state, &after));
        }

        return Err(AppError::InvalidCredentials {
            remaining_attempts: after.remaining_attempts,
        });
    }

    state.rate_limiter.reset(&client.0).await?;
    let session = start_session(&state, &cookies)?;

    tracing::info!("✅ Admin logged in from {}", client.0);

    let response = SessionResponse {
        success: true,
        expires_at: session.expires_at.timestamp_millis(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles admin logout. Always succeeds, even without a session.
#[axum::debug_handler]
pub async fn logout(cookies: Cookies) -> Response {
    // Added rather than removed so the expiry is sent even when the request
    // carried no cookie.
    let mut session_cookie = Cookie::new(SESSION_COOKIE, "");
    session_cookie.set_path("/");
    session_cookie.make_removal();
    cookies.add(session_cookie);

    tracing::info!("👋 Admin logged out");

    (StatusCode::OK, Json(LogoutResponse { success: true })).into_response()
}

/// Reports the current session. Only reachable through the auth gate.
#[axum::debug_handler]
pub async fn verify(
    State(state): State<AppState>,
    Extension(session): Extension<SessionData>,
) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        authenticated: true,
        expires_at: session.expires_at.timestamp_millis(),
        expiring_soon: state.sessions.is_expiring_soon(&session),
    })
}

/// Re-issues the session cookie for a client whose session is still valid.
#[axum::debug_handler]
pub async fn refresh(
    State(state): State<AppState>,
    Extension(_session): Extension<SessionData>,
    cookies: Cookies,
) -> Result<Response> {
    let session = start_session(&state, &cookies)?;
    tracing::info!("🔄 Admin session renewed until {}", session.expires_at);

    let response = SessionResponse {
        success: true,
        expires_at: session.expires_at.timestamp_millis(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
