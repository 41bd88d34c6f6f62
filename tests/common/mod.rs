//! Shared utilities for integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;

use auth_header_proxy::{HttpServer, ProxyConfig, Shutdown};
use axum::{http::HeaderMap, Json, Router};
use tokio::net::TcpListener;

pub const SECRET: &str = "s3cr3t";

/// Start an upstream that answers every request with the headers it received,
/// as a JSON object of name → list of values.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().fallback(|headers: HeaderMap| async move {
        let mut seen: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in headers.iter() {
            seen.entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        Json(seen)
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

/// Return an address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start the proxy in front of `upstream` with the test secret.
pub async fn start_proxy(upstream: SocketAddr) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<()>) {
    let mut config = ProxyConfig::default();
    config.upstream.address = upstream.to_string();
    config.timeouts.request_secs = 5;

    let mut secrets = HashMap::new();
    secrets.insert("X_AUTH_SIG_SECRET".to_string(), SECRET.to_string());

    let server = HttpServer::with_secrets(config, &secrets).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    (addr, shutdown, handle)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
