//! # Health & Observability Endpoints
//!
//! | Endpoint | Purpose | K8s Probe |
//! |----------|---------|-----------|
//! | `GET /healthz` | Liveness: the process serves HTTP | `livenessProbe` |
//! | `GET /readyz` | Readiness: the user database answers `SELECT 1` | `readinessProbe` |
//! | `GET /metrics` | Prometheus scrape target | `ServiceMonitor` |
//!
//! Both probes answer JSON so the same payload is readable by humans poking
//! the service. Readiness also reports whether a batch price check holds the
//! run lock, which is informational only and never fails the probe.

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use std::time::Duration;

const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn handler_healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn handler_readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match tokio::time::timeout(READINESS_TIMEOUT, state.db.health_check()).await {
        Ok(Ok(())) => "ok",
        Ok(Err(_)) => "unreachable",
        Err(_) => "timeout",
    };
    let batch_running = state.batch_lock.try_lock().is_err();
    let status = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "database": database,
            "batchRunning": batch_running,
        })),
    )
}

/// Current registry in OpenMetrics text format.
pub async fn handler_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(
            "content-type",
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        state.prom_metrics.encode(),
    )
}

pub async fn handler_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}
