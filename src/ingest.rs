//! # Ingest — Owner-Initiated Product Actions
//!
//! The user-facing paths: start tracking a URL, stop tracking a product, and
//! the two read paths the dashboard needs (list, price history).
//!
//! Every function returns an [`ActionResult`]: failures come back as a
//! structured [`ActionFailure`] with a short human-readable message, never as
//! a propagated error. Adding a product reuses the reconciler's gating rule
//! (history only for a first observation or a changed price) against a
//! separately looked-up existing row.
//!
//! Deletion is scoped to the caller's own products and always signals a view
//! refresh on exit through [`RefreshGuard`], whether it succeeded or not.
//!
//! Every fetch and store call runs under the `[batch]` deadlines, the same
//! ones the batch price check uses.

use anyhow::anyhow;
use serde::Serialize;
use std::future::Future;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::BatchSettings;
use crate::db::{PriceHistoryEntry, TrackedProduct};
use crate::error::{with_timeout, ErrorKind, TrackError};
use crate::fetcher::ProductFetcher;
use crate::reconcile::reconcile;
use crate::store::ProductStore;

pub const ADDED_MESSAGE: &str = "Product added successfully!";
pub const UPDATED_MESSAGE: &str = "Product updated with latest price!";
pub const DELETED_MESSAGE: &str = "Product deleted successfully!";

/// Receives "this owner's product list changed" signals.
pub trait ViewRefresh: Send + Sync {
    fn refresh_view(&self, owner: Option<Uuid>);
}

/// Fires [`ViewRefresh::refresh_view`] when dropped, on every exit path.
pub struct RefreshGuard<'a> {
    refresh: &'a dyn ViewRefresh,
    owner: Option<Uuid>,
}

impl<'a> RefreshGuard<'a> {
    pub fn new(refresh: &'a dyn ViewRefresh, owner: Option<Uuid>) -> Self {
        RefreshGuard { refresh, owner }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.refresh.refresh_view(self.owner);
    }
}

// ── Results ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionFailure {
    fn from_error(err: &TrackError, fallback: &str) -> Self {
        let message = err.to_string();
        ActionFailure {
            kind: err.kind(),
            message: if message.trim().is_empty() {
                fallback.to_string()
            } else {
                message
            },
        }
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        self.kind.status_code()
    }
}

pub type ActionResult<T> = Result<T, ActionFailure>;

#[derive(Debug, Clone, Serialize)]
pub struct AddedProduct {
    pub product: TrackedProduct,
    pub message: String,
    /// False when the (owner, url) row already existed.
    pub created: bool,
    pub price_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedProduct {
    pub message: String,
}

fn require_owner(owner: Option<Uuid>) -> Result<Uuid, TrackError> {
    owner.ok_or_else(|| TrackError::auth("Unauthorized"))
}

async fn store_call<T>(
    settings: &BatchSettings,
    what: &'static str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, TrackError> {
    with_timeout(
        settings.store_timeout(),
        async { fut.await.map_err(TrackError::from) },
        || TrackError::Store(anyhow!("{} timed out", what)),
    )
    .await
}

// ── Add / update ────────────────────────────────────────────────

/// Start tracking `url` for `owner`, or refresh it if already tracked.
pub async fn add_tracked_product(
    settings: &BatchSettings,
    store: &dyn ProductStore,
    fetcher: &dyn ProductFetcher,
    refresh: &dyn ViewRefresh,
    owner: Option<Uuid>,
    url: &str,
) -> ActionResult<AddedProduct> {
    match try_add(settings, store, fetcher, owner, url).await {
        Ok(added) => {
            refresh.refresh_view(owner);
            Ok(added)
        }
        Err(e) => {
            warn!(url = %url, error = %e, "failed to add product");
            Err(ActionFailure::from_error(&e, "Failed to add product"))
        }
    }
}

async fn try_add(
    settings: &BatchSettings,
    store: &dyn ProductStore,
    fetcher: &dyn ProductFetcher,
    owner: Option<Uuid>,
    url: &str,
) -> Result<AddedProduct, TrackError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(TrackError::validation("URL is required"));
    }
    let owner = require_owner(owner)?;
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return Err(TrackError::validation("URL must be an http(s) address")),
    }

    let fetch_timeout = settings.fetch_timeout();
    let scraped = with_timeout(fetch_timeout, fetcher.fetch(url), || {
        TrackError::extraction(format!(
            "fetch timed out after {}s",
            fetch_timeout.as_secs()
        ))
    })
    .await?;
    let existing = store_call(settings, "find product", store.find_product(owner, url)).await?;
    let decision = reconcile(existing.as_ref(), &scraped)
        .map_err(|_| TrackError::extraction("Could not extract product details from URL"))?;

    let upsert = decision.upsert_for(url);
    let product = store_call(settings, "upsert product", store.upsert_product(owner, &upsert)).await?;
    if let Some(entry) = decision.history_for(product.id) {
        store_call(settings, "insert history", store.insert_price_history(&entry)).await?;
    }

    let created = existing.is_none();
    info!(
        owner = %owner,
        product_id = %product.id,
        price = %product.current_price,
        created,
        price_changed = decision.is_new_or_changed,
        "product tracked"
    );
    Ok(AddedProduct {
        message: if created { ADDED_MESSAGE } else { UPDATED_MESSAGE }.to_string(),
        product,
        created,
        price_changed: decision.is_new_or_changed,
    })
}

// ── Delete ──────────────────────────────────────────────────────

/// Stop tracking one of the caller's products. History cascades in the store.
pub async fn delete_tracked_product(
    settings: &BatchSettings,
    store: &dyn ProductStore,
    refresh: &dyn ViewRefresh,
    owner: Option<Uuid>,
    product_id: Uuid,
) -> ActionResult<DeletedProduct> {
    let _refresh = RefreshGuard::new(refresh, owner);

    let result = async {
        let owner = require_owner(owner)?;
        let deleted =
            store_call(settings, "delete product", store.delete_product(owner, product_id)).await?;
        if !deleted {
            return Err(TrackError::validation("Product not found"));
        }
        info!(owner = %owner, product_id = %product_id, "product deleted");
        Ok::<(), TrackError>(())
    }
    .await;

    match result {
        Ok(()) => Ok(DeletedProduct {
            message: DELETED_MESSAGE.to_string(),
        }),
        Err(e) => {
            warn!(product_id = %product_id, error = %e, "failed to delete product");
            Err(ActionFailure::from_error(&e, "Failed to delete product"))
        }
    }
}

// ── Reads ───────────────────────────────────────────────────────

/// The caller's products, newest first.
pub async fn list_products(
    settings: &BatchSettings,
    store: &dyn ProductStore,
    owner: Option<Uuid>,
) -> ActionResult<Vec<TrackedProduct>> {
    let result = async {
        let owner = require_owner(owner)?;
        store_call(settings, "list products", store.list_products(owner)).await
    }
    .await;
    result.map_err(|e| ActionFailure::from_error(&e, "Failed to load products"))
}

/// Price observations for one of the caller's products, oldest first.
pub async fn price_history(
    settings: &BatchSettings,
    store: &dyn ProductStore,
    owner: Option<Uuid>,
    product_id: Uuid,
) -> ActionResult<Vec<PriceHistoryEntry>> {
    let result = async {
        let owner = require_owner(owner)?;
        store_call(settings, "load history", store.price_history(owner, product_id))
            .await?
            .ok_or_else(|| TrackError::validation("Product not found"))
    }
    .await;
    result.map_err(|e| ActionFailure::from_error(&e, "Failed to load price history"))
}
