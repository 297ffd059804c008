//! WebSocket handler: sends the caller's recent notifications on connect,
//! then forwards the broadcasts addressed to them.
//!
//! Browsers cannot set headers on a WebSocket handshake, so the Supabase JWT
//! may also arrive as `?access_token=`.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::middleware_auth::{decode_jwt, CurrentUser};
use super::AppState;
use crate::events::{Viewer, WsMessage};

#[derive(Deserialize)]
pub(super) struct WsAuth {
    access_token: Option<String>,
}

fn ws_owner(state: &AppState, user: &CurrentUser, auth: &WsAuth) -> Option<Uuid> {
    if let Some(owner) = user.owner() {
        return Some(owner);
    }
    let secret = state.secrets.jwt_secret.as_deref()?;
    let token = auth.access_token.as_deref()?;
    match decode_jwt(token, secret) {
        Ok(user) => Some(user.user_id),
        Err(e) => {
            debug!(error = %e, "rejected websocket token");
            None
        }
    }
}

pub(super) async fn handler_ws(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(auth): Query<WsAuth>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(owner) = ws_owner(&state, &user, &auth) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        )
            .into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let notif_rx = state.event_bus.subscribe_ws();
    ws.on_upgrade(move |socket| ws_loop(socket, state, Viewer::Owner(owner), notif_rx))
}

async fn ws_loop(
    mut socket: WebSocket,
    state: Arc<AppState>,
    viewer: Viewer,
    mut notif_rx: broadcast::Receiver<WsMessage>,
) {
    let hello = serde_json::json!({
        "type": "hello",
        "notifications": state.event_bus.recent_notifications(viewer, 20),
    });
    if socket
        .send(Message::Text(hello.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            result = notif_rx.recv() => {
                match result {
                    Ok(msg) if msg.audience.visible_to(viewer) => {
                        if socket.send(Message::Text(msg.json.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(_) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}
