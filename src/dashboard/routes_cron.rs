//! Batch price-check trigger, called by an external timer.
//!
//! `POST /api/cron/check-price` requires `Authorization: Bearer <CRON_SECRET>`
//! and runs one full batch before responding. A trigger that arrives while a
//! run is still in progress gets `409 Conflict` instead of a second run.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::middleware_auth::verify_cron_secret;
use super::AppState;
use crate::batch::BatchRunner;

pub(super) async fn handler_check_price_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Price check endpoint is working. Use POST to trigger a price check"
    }))
}

pub(super) async fn handler_check_price(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if !verify_cron_secret(&headers, state.secrets.cron_secret.as_deref()) {
        warn!("price check trigger rejected: bad or missing credential");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    let Ok(_running) = state.batch_lock.try_lock() else {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "success": false,
                "message": "A price check is already running",
            })),
        )
            .into_response();
    };

    let start = Instant::now();
    let runner = BatchRunner::new(
        state.admin.clone(),
        state.fetcher.clone(),
        state.notifier.clone(),
        state.settings.batch.clone(),
    )
    .with_events(state.event_bus.clone());

    match runner.run().await {
        Ok(report) => {
            state.prom_metrics.record_batch(&report, start.elapsed());
            info!(
                total = report.total,
                updated = report.updated,
                failed = report.failed,
                "price check finished"
            );
            Json(serde_json::json!({
                "success": true,
                "message": report.message(),
                "results": report,
            }))
            .into_response()
        }
        Err(e) => {
            state.prom_metrics.record_batch_error();
            error!(error = %e, "price check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "message": "Error checking prices",
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
