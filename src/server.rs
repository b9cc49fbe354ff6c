//! # HTTP Server
//!
//! HTTP transport for the operation surface, plus metrics and probes.
//!
//! Provides endpoints:
//! - `GET|POST|DELETE /v1/config` - Connection profile read / write / delete
//! - `GET /v1/sa` - Binding names
//! - `GET|POST|DELETE /v1/sa/{name}` - Binding read / write / delete
//! - `POST /v1/secrets/{name}` - Issue a token Secret for a binding
//! - `POST /v1/leases/renew`, `POST /v1/leases/revoke` - Lease callbacks
//! - `POST /v1/wal/replay`, `POST /v1/wal/rollback` - Recovery callbacks
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 once the backend is ready)
//!
//! User errors are answered with `{"errors": [...]}` and 400 (404 for unknown
//! objects); hard failures with the same body and 500.

use crate::backend::{Backend, IssueRequest, ReplayRequest};
use crate::binding::BindingWriteRequest;
use crate::connection::ConfigWriteRequest;
use crate::error::Error;
use crate::lease::{IssuedLease, LeaseResponse};
use crate::observability::metrics;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug)]
pub struct ServerState {
    pub backend: Arc<Backend>,
    pub is_ready: Arc<AtomicBool>,
    /// Minimum entry age used by `POST /v1/wal/rollback` without `min_age_secs`
    pub wal_rollback_min_age: Duration,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(
            "/v1/config",
            get(read_config).post(write_config).delete(delete_config),
        )
        .route("/v1/sa", get(list_bindings))
        .route(
            "/v1/sa/{name}",
            get(read_binding).post(write_binding).delete(delete_binding),
        )
        .route("/v1/secrets/{name}", post(issue))
        .route("/v1/leases/renew", post(renew))
        .route("/v1/leases/revoke", post(revoke))
        .route("/v1/wal/replay", post(replay))
        .route("/v1/wal/rollback", post(rollback))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(
    port: u16,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// Error response
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    errors: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_user_error() => StatusCode::BAD_REQUEST,
            e => {
                error!(error = %e, reason = e.reason(), "operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            errors: vec![self.0.to_string()],
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Issue and renew response: the client view plus the lease the host keeps
#[derive(Debug, Serialize, Deserialize)]
pub struct LeaseEnvelope {
    #[serde(flatten)]
    pub response: LeaseResponse,
    pub lease: IssuedLease,
}

impl From<IssuedLease> for LeaseEnvelope {
    fn from(lease: IssuedLease) -> Self {
        Self {
            response: lease.response(),
            lease,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyList {
    keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RollbackParams {
    min_age_secs: Option<u64>,
}

async fn read_config(State(state): State<Arc<ServerState>>) -> ApiResult<impl IntoResponse> {
    let view = state
        .backend
        .read_config()
        .await?
        .ok_or_else(|| Error::NotFound(Error::Unconfigured.to_string()))?;
    Ok(Json(view))
}

async fn write_config(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ConfigWriteRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.backend.write_config(request).await?))
}

async fn delete_config(State(state): State<Arc<ServerState>>) -> ApiResult<StatusCode> {
    state.backend.delete_config().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_bindings(State(state): State<Arc<ServerState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(KeyList {
        keys: state.backend.list_bindings().await?,
    }))
}

async fn read_binding(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let binding = state
        .backend
        .read_binding(&name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("binding '{name}' not found")))?;
    Ok(Json(binding))
}

async fn write_binding(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Json(request): Json<BindingWriteRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.backend.write_binding(&name, request).await?))
}

async fn delete_binding(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.backend.delete_binding(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn issue(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    // Body is optional: an empty body asks for the default TTL
    let request: IssueRequest = if body.iter().all(u8::is_ascii_whitespace) {
        IssueRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("invalid issue request: {e}")))?
    };

    // Cancelled when the client goes away and this future is dropped
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let lease = state.backend.issue(&name, request, &cancel).await?;
    Ok(Json(LeaseEnvelope::from(lease)))
}

async fn renew(
    State(state): State<Arc<ServerState>>,
    Json(lease): Json<IssuedLease>,
) -> ApiResult<impl IntoResponse> {
    let lease = state.backend.renew(lease).await?;
    Ok(Json(LeaseEnvelope::from(lease)))
}

async fn revoke(
    State(state): State<Arc<ServerState>>,
    Json(lease): Json<IssuedLease>,
) -> ApiResult<StatusCode> {
    state.backend.revoke(&lease).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replay(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ReplayRequest>,
) -> ApiResult<StatusCode> {
    state.backend.replay(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rollback(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<RollbackParams>,
) -> ApiResult<impl IntoResponse> {
    let min_age = params
        .min_age_secs
        .map_or(state.wal_rollback_min_age, Duration::from_secs);
    Ok(Json(state.backend.rollback(min_age).await?))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_text() {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            text,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of_errors() {
        let status = |e: Error| ApiError(e).into_response().status();
        assert_eq!(status(Error::NotFound("x".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(status(Error::Unconfigured), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(Error::PolicyViolation {
                max: Duration::from_secs(1),
                requested: Duration::from_secs(2),
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(Error::Cancelled), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
