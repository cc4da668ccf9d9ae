//! Shared helpers for router-level tests.

use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use mcp_compose_proxy::{ProxyServer, ProxySettings};
use mcp_compose_session::BackendSession;
use mcp_compose_test_utils::oauth_manifest;

pub const API_KEY: &str = "fixture-api-key-0123456789";

pub fn proxy() -> ProxyServer {
    ProxyServer::new(
        oauth_manifest(),
        PathBuf::from("mcp-compose.yaml"),
        ProxySettings::default(),
    )
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn form_post(path: &str, body: String) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request")
}

pub fn json_post(path: &str, body: Value) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {API_KEY}"))
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Wait until a session reports `Ready`; scripted backends handshake in
/// milliseconds, so a short poll is enough.
pub async fn wait_ready(session: &BackendSession) {
    for _ in 0..100 {
        if session.is_ready().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session '{}' never became ready", session.name());
}
