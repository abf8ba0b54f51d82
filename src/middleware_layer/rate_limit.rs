use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::state::AppState;

/// The rate-limit identifier of the client that sent a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

/// Picks the client address out of the forwarding headers, if any.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let from_forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let from_real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    from_forwarded_for.or_else(from_real_ip).map(str::to_string)
}

/// Derives a stable identifier for the client sending `req`.
///
/// The peer address is used unless a fronting proxy is trusted to set the
/// forwarding headers; clients can put anything in them.
///
/// # Arguments
///
/// * `req` - The incoming request.
/// * `trust_proxy_headers` - Whether `X-Forwarded-For` / `X-Real-IP` win over the peer address.
///
/// # Returns
///
/// The normalized client address, or "unknown" if none can be found.
pub fn identify<B>(req: &Request<B>, trust_proxy_headers: bool) -> String {
    let header_ip = if trust_proxy_headers {
        forwarded_ip(req.headers())
    } else {
        None
    };

    header_ip
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .map(|ip| ip.to_ascii_lowercase())
        .unwrap_or_else(|| "unknown".to_string())
}

/// A middleware that tags the request with the caller's [`ClientId`].
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
pub async fn tag_client(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let client = identify(&req, state.config.trust_proxy_headers);
    tracing::debug!("🔎 Login attempt from {}", client);
    req.extensions_mut().insert(ClientId(client));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = http::Request::builder().uri("/api/auth/login");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn prefers_first_forwarded_for_entry() {
        let req = request(&[
            ("x-forwarded-for", " 203.0.113.7 , 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(identify(&req, true), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let req = request(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(identify(&req, true), "198.51.100.2");

        let mut req = request(&[]);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 5555))));
        assert_eq!(identify(&req, true), "192.0.2.9");
    }

    #[test]
    fn ignores_headers_when_untrusted() {
        let mut req = request(&[("x-forwarded-for", "203.0.113.7")]);
        assert_eq!(identify(&req, false), "unknown");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 5555))));
        assert_eq!(identify(&req, false), "192.0.2.9");
    }

    #[test]
    fn normalizes_ipv6_case() {
        let req = request(&[("x-forwarded-for", "2001:DB8::1")]);
        assert_eq!(identify(&req, true), "2001:db8::1");
    }
}
