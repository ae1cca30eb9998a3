#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use school_server::config::{Config, SCHOOL_DB};
use school_server::middleware::TlsConnection;
use school_server::{app, startup};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Config pointing `SchoolDb` at a fresh database file inside `dir`.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.set_connection_string(
        SCHOOL_DB,
        format!("Data Source={}", dir.path().join("school.db").display()),
    );
    config.server.port = 0;
    config
}

/// Runs the startup sequence and returns the router, panicking on failure.
pub fn setup_app(config: &Config) -> Router {
    let (state, outcome) = startup::bootstrap(config).expect("bootstrap should succeed");
    assert!(outcome.is_success(), "migrations should succeed: {outcome:?}");
    app(state)
}

/// Sends a request marked as having arrived on the TLS listener.
pub async fn send(app: &Router, mut request: Request<Body>) -> (StatusCode, Value) {
    request.extensions_mut().insert(TlsConnection);
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
