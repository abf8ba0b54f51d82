use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use menugate::{
    app,
    clock::{Clock, ManualClock},
    config::Config,
    middleware_layer::auth::SESSION_COOKIE,
    services::rate_limit::{MemoryRateLimiter, RateLimiter},
    state::{AppState, rate_limit_policy},
};

const PASSWORD: &str = "SecurePass123!@#";

// Shared test context
struct TestContext {
    app: Router,
    clock: ManualClock,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestContext {
    fn new() -> Self {
        let config = Config::with_secrets(PASSWORD, b"integration-secret-integration-secret");
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let limiter = RateLimiter::Memory(MemoryRateLimiter::new(
            rate_limit_policy(&config),
            shared.clone(),
        ));
        let state = AppState::with_parts(&config, shared, limiter).unwrap();

        Self {
            app: app::router(state),
            clock,
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn login(&self, password: &str, client_ip: &str) -> TestResponse {
        self.login_via(password, client_ip, None).await
    }

    async fn login_via(
        &self,
        password: &str,
        peer_ip: &str,
        forwarded_for: Option<&str>,
    ) -> TestResponse {
        let mut builder =
            Request::post("/api/auth/login").header(header::CONTENT_TYPE, "application/json");
        if let Some(forwarded_for) = forwarded_for {
            builder = builder.header("x-forwarded-for", forwarded_for);
        }
        let mut request = builder
            .body(Body::from(json!({ "password": password }).to_string()))
            .unwrap();

        let ip: IpAddr = peer_ip.parse().unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(ip, 40000)));
        self.send(request).await
    }

    async fn get_with_session(&self, uri: &str, token: &str) -> TestResponse {
        let request = Request::get(uri)
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn revalidate(&self, token: &str, payload: Value) -> TestResponse {
        let request = Request::post("/api/admin/revalidate")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .body(Body::from(payload.to_string()))
            .unwrap();
        self.send(request).await
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix(&format!("{}=", SESSION_COOKIE)).map(str::to_string))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

fn flip_char(token: &str, index: usize) -> String {
    let mut bytes = token.as_bytes().to_vec();
    bytes[index] = if bytes[index] == b'x' { b'y' } else { b'x' };
    String::from_utf8(bytes).unwrap()
}

#[tokio::test]
async fn login_sets_cookie_and_session_verifies() {
    let ctx = TestContext::new();

    let login = ctx.login(PASSWORD, "203.0.113.10").await;
    assert_eq!(login.status, StatusCode::OK, "Login failed");
    assert_eq!(login.body["success"], true);

    let token = session_cookie(&login.headers).expect("session cookie not set");
    let cookie_header = login.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie_header.contains("HttpOnly"));

    let verify = ctx.get_with_session("/api/auth/verify", &token).await;
    assert_eq!(verify.status, StatusCode::OK);
    assert_eq!(verify.body["authenticated"], true);
    assert_eq!(verify.body["expiringSoon"], false);
    assert_eq!(verify.body["expiresAt"], login.body["expiresAt"]);
    // The gate admits the request without re-issuing the cookie.
    assert!(verify.headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn wrong_password_reports_remaining_attempts() {
    let ctx = TestContext::new();

    let response = ctx.login("guess", "203.0.113.11").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "INVALID_CREDENTIALS");
    assert_eq!(response.body["remainingAttempts"], 4);
    assert!(session_cookie(&response.headers).is_none());
}

#[tokio::test]
async fn lockout_blocks_even_correct_password_until_it_lapses() {
    let ctx = TestContext::new();
    let ip = "198.51.100.20";

    for expected_left in (1..=4).rev() {
        let response = ctx.login("wrong", ip).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["remainingAttempts"], expected_left);
    }

    let fifth = ctx.login("wrong", ip).await;
    assert_eq!(fifth.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(fifth.body["code"], "RATE_LIMITED");

    let sixth = ctx.login(PASSWORD, ip).await;
    assert_eq!(sixth.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(sixth.body["code"], "RATE_LIMITED");
    assert!(sixth.body["error"].as_str().unwrap().contains("15 minutes"));
    assert!(sixth.body.get("remainingAttempts").is_none());

    // Another client is not affected.
    let other = ctx.login(PASSWORD, "198.51.100.21").await;
    assert_eq!(other.status, StatusCode::OK);

    ctx.clock.advance(Duration::minutes(15));

    let after = ctx.login(PASSWORD, ip).await;
    assert_eq!(after.status, StatusCode::OK);

    // Success cleared the counter.
    let next_failure = ctx.login("wrong", ip).await;
    assert_eq!(next_failure.body["remainingAttempts"], 4);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_escape_lockout() {
    let ctx = TestContext::new();

    let mut statuses = Vec::new();
    for i in 0..20 {
        let spoofed = format!("10.9.9.{}", i);
        let response = ctx.login_via("wrong", "192.0.2.1", Some(&spoofed)).await;
        statuses.push(response.status);
    }

    assert!(statuses[..4].iter().all(|s| *s == StatusCode::UNAUTHORIZED));
    assert!(statuses[4..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));

    let correct = ctx.login_via(PASSWORD, "192.0.2.1", Some("10.9.9.250")).await;
    assert_eq!(correct.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn tampered_cookie_is_rejected_on_protected_api() {
    let ctx = TestContext::new();
    let login = ctx.login(PASSWORD, "203.0.113.12").await;
    let token = session_cookie(&login.headers).unwrap();

    let payload = json!({ "entityType": "dish", "entity": { "slug": "x", "type": "food" } });

    let ok = ctx.revalidate(&token, payload.clone()).await;
    assert_eq!(ok.status, StatusCode::OK);
    let paths: Vec<&str> = ok.body["paths"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["/api/dishes", "/api/dishes/x", "/food"]);

    let tampered = flip_char(&token, token.len() / 2);
    let denied = ctx.revalidate(&tampered, payload).await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    assert_eq!(denied.body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn missing_cookie_redirects_pages_and_rejects_api() {
    let ctx = TestContext::new();

    let page = ctx
        .send(Request::get("/admin/dishes?tab=drinks").body(Body::empty()).unwrap())
        .await;
    assert_eq!(page.status, StatusCode::SEE_OTHER);
    assert_eq!(
        page.headers[header::LOCATION],
        "/admin/login?redirect=%2Fadmin%2Fdishes%3Ftab%3Ddrinks"
    );

    let api = ctx
        .send(Request::get("/api/auth/verify").body(Body::empty()).unwrap())
        .await;
    assert_eq!(api.status, StatusCode::UNAUTHORIZED);
    assert_eq!(api.body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn login_page_is_not_gated() {
    let ctx = TestContext::new();
    let page = ctx
        .send(Request::get("/admin/login").body(Body::empty()).unwrap())
        .await;
    assert_ne!(page.status, StatusCode::SEE_OTHER);
    assert_ne!(page.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_expires_after_twelve_hours() {
    let ctx = TestContext::new();
    let login = ctx.login(PASSWORD, "203.0.113.13").await;
    let token = session_cookie(&login.headers).unwrap();

    ctx.clock.advance(Duration::hours(11) + Duration::minutes(30));
    let soon = ctx.get_with_session("/api/auth/verify", &token).await;
    assert_eq!(soon.status, StatusCode::OK);
    assert_eq!(soon.body["expiringSoon"], true);

    ctx.clock.advance(Duration::minutes(30));
    let expired = ctx.get_with_session("/api/auth/verify", &token).await;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_issues_a_new_session() {
    let ctx = TestContext::new();
    let login = ctx.login(PASSWORD, "203.0.113.14").await;
    let token = session_cookie(&login.headers).unwrap();

    ctx.clock.advance(Duration::hours(11) + Duration::minutes(30));
    let request = Request::post("/api/auth/refresh")
        .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .body(Body::empty())
        .unwrap();
    let refreshed = ctx.send(request).await;
    assert_eq!(refreshed.status, StatusCode::OK);

    let new_token = session_cookie(&refreshed.headers).unwrap();
    assert_ne!(new_token, token);

    ctx.clock.advance(Duration::hours(1));
    assert_eq!(
        ctx.get_with_session("/api/auth/verify", &token).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        ctx.get_with_session("/api/auth/verify", &new_token).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn logout_clears_cookie_without_a_session() {
    let ctx = TestContext::new();
    let response = ctx
        .send(Request::post("/api/auth/logout").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);

    let cookie = response.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("{}=", SESSION_COOKIE)));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn malformed_login_body_is_a_generic_error() {
    let ctx = TestContext::new();
    let request = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = ctx.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "Invalid request body");
}

#[tokio::test]
async fn health_is_public() {
    let ctx = TestContext::new();
    let response = ctx
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}
