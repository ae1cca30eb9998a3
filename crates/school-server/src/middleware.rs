use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::AppState;

/// Request extension marking a request that arrived on the TLS listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsConnection;

/// HTTPS redirection settings resolved at startup.
#[derive(Debug, Clone)]
pub struct HttpsRedirection {
    /// Target port; `None` disables redirection.
    pub port: Option<u16>,
    pub status: StatusCode,
    /// Treat `X-Forwarded-Proto: https` as proof the client used HTTPS.
    pub trust_forwarded_proto: bool,
    warned: Arc<AtomicBool>,
}

impl HttpsRedirection {
    pub fn new(port: Option<u16>, status: StatusCode, trust_forwarded_proto: bool) -> Self {
        Self {
            port,
            status,
            trust_forwarded_proto,
            warned: Arc::new(AtomicBool::new(false)),
        }
    }

    fn warn_missing_port_once(&self) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!("failed to determine the https port for redirect");
        }
    }

    fn is_https(&self, req: &Request<Body>) -> bool {
        if req.extensions().get::<TlsConnection>().is_some() {
            return true;
        }
        // Only meaningful behind a proxy that overwrites the header.
        self.trust_forwarded_proto
            && req
                .headers()
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
    }
}

/// Strips a trailing `:port` from a `Host` value, keeping IPv6 brackets.
fn host_without_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// Builds the HTTPS URL a plain request should be sent to.
///
/// The port is omitted when it is 443.
pub fn redirect_location(host: &str, https_port: u16, path_and_query: &str) -> String {
    let host = host_without_port(host);
    let path_and_query = if path_and_query.is_empty() {
        "/"
    } else {
        path_and_query
    };
    if https_port == 443 {
        format!("https://{host}{path_and_query}")
    } else {
        format!("https://{host}:{https_port}{path_and_query}")
    }
}

/// Middleware redirecting plain HTTP requests to HTTPS.
///
/// Requests from the TLS listener, or carrying `X-Forwarded-Proto: https`
/// when that header is trusted, pass through. When no HTTPS port is known, a
/// warning is logged once and requests pass through unchanged.
pub async fn https_redirect_middleware(
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    if state.https.is_https(&req) {
        return Ok(next.run(req).await);
    }

    let Some(port) = state.https.port else {
        state.https.warn_missing_port_once();
        return Ok(next.run(req).await);
    };

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .ok_or(StatusCode::BAD_REQUEST)?;

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let location = redirect_location(&host, port, path_and_query);
    let location = HeaderValue::from_str(&location).map_err(|_| StatusCode::BAD_REQUEST)?;

    tracing::debug!(location = ?location, "redirecting to https");

    let mut response = Response::new(Body::empty());
    *response.status_mut() = state.https.status;
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

/// Middleware guarding routes flagged `authorize` in the route table.
///
/// Accepts `Authorization: Bearer <key>` where the key is one of the
/// configured API keys. With no keys configured every request is allowed.
pub async fn authorize_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    if state.api_keys.is_empty() {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let authorized = matches!(token, Some(t) if state.api_keys.iter().any(|key| key == t));
    if authorized {
        return Ok(next.run(req).await);
    }

    tracing::debug!(path = %req.uri().path(), "rejecting unauthorized request");
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer"),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_drops_host_port_and_keeps_query() {
        assert_eq!(
            redirect_location("school.example:5000", 5001, "/api/students?page=2"),
            "https://school.example:5001/api/students?page=2"
        );
    }

    #[test]
    fn location_omits_default_https_port() {
        assert_eq!(
            redirect_location("school.example", 443, "/health"),
            "https://school.example/health"
        );
    }

    #[test]
    fn location_keeps_ipv6_brackets() {
        assert_eq!(
            redirect_location("[::1]:8080", 8443, ""),
            "https://[::1]:8443/"
        );
    }

    fn forwarded_https() -> Request<Body> {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn forwarded_proto_is_ignored_unless_trusted() {
        let untrusted = HttpsRedirection::new(Some(5001), StatusCode::TEMPORARY_REDIRECT, false);
        assert!(!untrusted.is_https(&forwarded_https()));

        let trusted = HttpsRedirection::new(Some(5001), StatusCode::TEMPORARY_REDIRECT, true);
        assert!(trusted.is_https(&forwarded_https()));
    }

    #[test]
    fn tls_listener_marker_counts_as_https() {
        let redirection = HttpsRedirection::new(Some(5001), StatusCode::TEMPORARY_REDIRECT, false);
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert!(!redirection.is_https(&req));
        req.extensions_mut().insert(TlsConnection);
        assert!(redirection.is_https(&req));
    }

    #[test]
    fn host_without_numeric_port_is_unchanged() {
        assert_eq!(host_without_port("localhost"), "localhost");
        assert_eq!(host_without_port("odd:name"), "odd:name");
    }
}
