mod common;

use common::test_config;
use school_server::config::TlsConfig;
use school_server::startup;
use std::time::Duration;
use tempfile::TempDir;

/// Writes a self-signed certificate for `localhost` and returns the TLS
/// settings pointing at it.
fn self_signed_tls(dir: &TempDir, port: u16) -> TlsConfig {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .unwrap();

    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    std::fs::write(&cert_path, certified.cert.pem()).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

    TlsConfig {
        port,
        cert_path,
        key_path,
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_tls_listener_serves_and_plain_port_redirects_to_it() {
    // Both rustls backends are compiled into the test build; pick one.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let dir = tempfile::tempdir().unwrap();
    let tls_port = free_port();
    let mut config = test_config(&dir);
    config.server.tls = Some(self_signed_tls(&dir, tls_port));

    let server = startup::start(&config).await.unwrap();
    let http_addr = server.http_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();

    let redirect = client
        .get(format!("http://{http_addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(redirect.status(), reqwest::StatusCode::TEMPORARY_REDIRECT);
    let location = redirect.headers()["location"].to_str().unwrap().to_string();
    assert_eq!(location, format!("https://127.0.0.1:{tls_port}/health"));

    // The TLS listener binds inside `serve`; retry until it accepts.
    let mut response = None;
    for _ in 0..50 {
        match client.get(&location).send().await {
            Ok(r) => {
                response = Some(r);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    let response = response.expect("tls listener should accept connections");
    assert_eq!(
        response.status(),
        reqwest::StatusCode::OK,
        "requests on the TLS port must not be redirected again"
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    drop(client);
    stop_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_missing_certificate_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.server.tls = Some(TlsConfig {
        port: free_port(),
        cert_path: dir.path().join("absent-cert.pem"),
        key_path: dir.path().join("absent-key.pem"),
    });

    let err = startup::start(&config).await.err().unwrap();
    assert!(matches!(err, startup::StartupError::Tls(_)));
}
