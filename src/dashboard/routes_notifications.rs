//! Activity feeds for the dashboard: squashed notifications and the raw event
//! log, newest first. `?limit=` trims the list, capped at what the bus keeps.
//!
//! A signed-in owner sees only their own products' activity. The cron secret
//! reads the operator view, which adds batch summaries, warnings and errors.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::middleware_auth::{verify_cron_secret, CurrentUser};
use super::AppState;
use crate::events::Viewer;

const NOTIFICATION_LIMIT: usize = 50;
const EVENT_LIMIT: usize = 200;

#[derive(Deserialize)]
pub(super) struct FeedQuery {
    limit: Option<usize>,
}

impl FeedQuery {
    fn limit(&self, max: usize) -> usize {
        self.limit.map_or(max, |l| l.min(max))
    }
}

fn feed_viewer(state: &AppState, headers: &HeaderMap, user: &CurrentUser) -> Option<Viewer> {
    if verify_cron_secret(headers, state.secrets.cron_secret.as_deref()) {
        return Some(Viewer::Operator);
    }
    user.owner().map(Viewer::Owner)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

pub(super) async fn handler_notification_feed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    user: CurrentUser,
    Query(query): Query<FeedQuery>,
) -> Response {
    let Some(viewer) = feed_viewer(&state, &headers, &user) else {
        return unauthorized();
    };
    let notifications = state
        .event_bus
        .recent_notifications(viewer, query.limit(NOTIFICATION_LIMIT));
    Json(serde_json::json!({ "notifications": notifications })).into_response()
}

pub(super) async fn handler_event_log(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    user: CurrentUser,
    Query(query): Query<FeedQuery>,
) -> Response {
    let Some(viewer) = feed_viewer(&state, &headers, &user) else {
        return unauthorized();
    };
    let events = state
        .event_bus
        .recent_events(viewer, query.limit(EVENT_LIMIT));
    Json(serde_json::json!({ "events": events })).into_response()
}
