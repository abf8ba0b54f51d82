use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    models::session::SessionData,
    services::session::{SessionCodec, SessionValidation},
    state::AppState,
};

/// Name of the cookie holding the admin session token.
pub const SESSION_COOKIE: &str = "admin_session";

/// Where unauthenticated page requests are sent.
pub const LOGIN_PAGE: &str = "/admin/login";

/// Paths that must stay reachable without a session, or nobody could log in.
const EXEMPT_PREFIXES: &[&str] = &[
    LOGIN_PAGE,
    "/admin/assets",
    "/api/auth/login",
    "/api/auth/logout",
];

/// What the gate decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The path bypasses the gate entirely.
    Exempt,
    Allowed(SessionData),
    Denied,
}

/// Whether `path` is one of the login or auth-exchange routes.
pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PREFIXES.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Decides a request from its path and session cookie alone.
pub fn decide(path: &str, token: Option<&str>, codec: &SessionCodec) -> GateDecision {
    if is_exempt(path) {
        return GateDecision::Exempt;
    }

    let Some(token) = token.filter(|t| !t.is_empty()) else {
        tracing::debug!("❌ No {} cookie found", SESSION_COOKIE);
        return GateDecision::Denied;
    };

    match codec.validate(token) {
        SessionValidation::Valid(session) => GateDecision::Allowed(session),
        SessionValidation::Invalid => GateDecision::Denied,
    }
}

/// Rejection for a denied request: JSON 401 for the API, a login redirect for pages.
fn denied_response(path: &str, target: &str) -> Response {
    if path.starts_with("/api/") {
        return AppError::Unauthenticated.into_response();
    }

    let redirect: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    Redirect::to(&format!("{}?redirect={}", LOGIN_PAGE, redirect)).into_response()
}

/// A middleware that admits only requests carrying a valid admin session.
///
/// The decoded session is attached to the request extensions. The cookie is
/// never refreshed here; renewal goes through `/api/auth/refresh`.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
pub async fn require_admin(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| request.uri().clone());
    let path = uri.path();

    let token = cookies.get(SESSION_COOKIE).map(|c| c.value().to_string());

    match decide(path, token.as_deref(), &state.sessions) {
        GateDecision::Exempt => next.run(request).await,
        GateDecision::Allowed(session) => {
            tracing::debug!("✅ Admin session accepted for {}", path);
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        GateDecision::Denied => {
            tracing::warn!("🔒 Denied unauthenticated request to {}", path);
            let target = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or(path);
            denied_response(path, target)
        }
    }
}
