//! Owner-facing product API: add, list, delete, and price history.
//!
//! Every handler resolves the caller from the Supabase JWT via
//! [`CurrentUser`]; the ingestion functions decide what an anonymous caller
//! gets (always `401 Unauthorized`).

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::middleware_auth::CurrentUser;
use super::AppState;
use crate::events::Event;
use crate::ingest::{self, ActionFailure};

#[derive(Deserialize)]
pub(super) struct AddProductRequest {
    #[serde(default)]
    url: String,
}

fn failure_response(failure: ActionFailure) -> Response {
    (
        failure.status_code(),
        Json(serde_json::json!({ "error": failure.message })),
    )
        .into_response()
}

pub(super) async fn handler_add_product(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<AddProductRequest>,
) -> Response {
    let added = match ingest::add_tracked_product(
        &state.settings.batch,
        &state.db,
        &*state.fetcher,
        &*state.event_bus,
        user.owner(),
        &payload.url,
    )
    .await
    {
        Ok(added) => added,
        Err(failure) => return failure_response(failure),
    };

    let product = &added.product;
    state.event_bus.emit(if added.created {
        Event::ProductAdded {
            owner: product.user_id,
            name: product.name.clone(),
            price: product.current_price,
            currency: product.currency.clone(),
        }
    } else {
        Event::ProductUpdated {
            owner: product.user_id,
            name: product.name.clone(),
            price: product.current_price,
            currency: product.currency.clone(),
            price_changed: added.price_changed,
        }
    });

    let status = if added.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(serde_json::json!({
            "success": true,
            "product": added.product,
            "message": added.message,
        })),
    )
        .into_response()
}

pub(super) async fn handler_list_products(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Response {
    match ingest::list_products(&state.settings.batch, &state.db, user.owner()).await {
        Ok(products) => Json(serde_json::json!({ "products": products })).into_response(),
        Err(failure) => failure_response(failure),
    }
}

pub(super) async fn handler_price_history(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    match ingest::price_history(&state.settings.batch, &state.db, user.owner(), id).await {
        Ok(history) => Json(serde_json::json!({ "history": history })).into_response(),
        Err(failure) => failure_response(failure),
    }
}

pub(super) async fn handler_delete_product(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    let deleted = ingest::delete_tracked_product(
        &state.settings.batch,
        &state.db,
        &*state.event_bus,
        user.owner(),
        id,
    )
    .await;
    match deleted {
        Ok(deleted) => {
            if let Some(owner) = user.owner() {
                state.event_bus.emit(Event::ProductDeleted {
                    owner,
                    product_id: id,
                });
            }
            Json(serde_json::json!({ "success": true, "message": deleted.message }))
                .into_response()
        }
        Err(failure) => failure_response(failure),
    }
}
