//! # HTTP Server Tests
//!
//! Drives the axum router with `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{harness, Harness, TEST_CA};
use k8s_secrets_engine::server::{router, ServerState};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(h: &Harness, ready: bool) -> (Router, Arc<ServerState>) {
    let state = Arc::new(ServerState {
        backend: Arc::clone(&h.backend),
        is_ready: Arc::new(AtomicBool::new(ready)),
        wal_rollback_min_age: Duration::from_secs(300),
    });
    (router(Arc::clone(&state)), state)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn configure(app: &Router) {
    let (status, _) = call(
        app,
        "POST",
        "/v1/config",
        Some(json!({
            "api-url": "https://localhost:8443/",
            "token": "123qwe",
            "CA": TEST_CA,
            "ttl": 100,
            "max-ttl": 200
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_probes() {
    let h = harness();
    let (app, state) = app(&h, false);

    let (status, _) = call(&app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.is_ready.store(true, Ordering::Relaxed);
    let (status, _) = call(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_config_endpoints() {
    let h = harness();
    let (app, _) = app(&h, true);

    let (status, body) = call(&app, "GET", "/v1/config", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["errors"][0].as_str().unwrap().contains("not configured"));

    configure(&app).await;
    let (status, body) = call(&app, "GET", "/v1/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api-url"], "https://localhost:8443/");
    assert_eq!(body["CA"], TEST_CA);
    assert_eq!(body["ttl"], 100);
    assert_eq!(body["max-ttl"], 200);
    assert!(body.get("token").is_none());

    let (status, body) = call(&app, "POST", "/v1/config", Some(json!({"ttl": 500}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].is_array());

    let (status, _) = call(&app, "DELETE", "/v1/config", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", "/v1/config", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_binding_endpoints() {
    let h = harness();
    let (app, _) = app(&h, true);

    let (status, body) = call(&app, "POST", "/v1/sa/b1", Some(json!({"namespace": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0], "service-account-name is required");

    let (status, body) = call(
        &app,
        "POST",
        "/v1/sa/b1",
        Some(json!({"namespace": "x", "service-account-name": "y"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service-account-name"], "y");

    let (status, body) = call(&app, "GET", "/v1/sa", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keys"], json!(["b1"]));

    let (status, body) = call(&app, "GET", "/v1/sa/b1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["namespace"], "x");

    for _ in 0..2 {
        let (status, _) = call(&app, "DELETE", "/v1/sa/b1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (status, _) = call(&app, "GET", "/v1/sa/b1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_issue_renew_revoke_over_http() {
    let h = harness();
    let (app, _) = app(&h, true);
    configure(&app).await;
    h.bind("b1", "x", "y").await;

    let (status, body) = call(&app, "POST", "/v1/secrets/b1", Some(json!({"ttl": 500}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"][0],
        "Max TTL configured to '200', you try to create TTL '500'"
    );

    let (status, body) = call(&app, "POST", "/v1/secrets/b1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lease_duration"], 100);
    assert_eq!(body["data"]["namespace"], "x");
    assert!(body["data"]["token"].is_string());
    assert!(body.get("internal").is_none());
    let lease = body["lease"].clone();
    assert!(lease["internal"]["secret-name"]
        .as_str()
        .unwrap()
        .starts_with("vault-y-"));

    let (status, body) = call(&app, "POST", "/v1/leases/renew", Some(lease.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lease_duration"], 100);

    let (status, _) = call(&app, "POST", "/v1/leases/revoke", Some(lease.clone())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.cluster.secrets().is_empty());

    let (status, _) = call(&app, "POST", "/v1/leases/revoke", Some(lease)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_issue_unknown_binding_is_not_found() {
    let h = harness();
    let (app, _) = app(&h, true);
    configure(&app).await;

    let (status, body) = call(&app, "POST", "/v1/secrets/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0], "ServiceAccount 'nope' not found");
}

#[tokio::test]
async fn test_wal_endpoints() {
    let h = harness();
    let (app, _) = app(&h, true);
    configure(&app).await;

    let (status, _) = call(
        &app,
        "POST",
        "/v1/wal/replay",
        Some(json!({"kind": "secret", "payload": {"name": "vault-y-abcd1234", "namespace": "x"}})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/wal/replay",
        Some(json!({"kind": "user", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errors"][0], "unknown kind to rollback: user");

    let (status, body) = call(&app, "POST", "/v1/wal/rollback?min_age_secs=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["replayed"], json!([]));
    assert_eq!(body["failed"], json!([]));
}
