//! # Store — Persistence Capabilities Used by the Core
//!
//! Two traits split the store by privilege:
//!
//! - [`ProductStore`]: everything a signed-in owner may do. Every method takes
//!   the owner id and the implementation filters on it.
//! - [`AdminStore`]: the cross-owner reads and writes the batch price check
//!   needs. Only [`AdminDatabase`] implements it, and it is only built from the
//!   service connection URL, so holding one is the elevated credential.
//!
//! Methods return `anyhow::Result` like the sqlx layer beneath them; the core
//! converts failures into `TrackError::Store` at its boundary.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{
    AdminDatabase, Database, NewPriceHistory, PriceHistoryEntry, PriceRefresh, ProductUpsert,
    TrackedProduct,
};

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_product(&self, owner: Uuid, url: &str) -> Result<Option<TrackedProduct>>;
    async fn upsert_product(&self, owner: Uuid, product: &ProductUpsert) -> Result<TrackedProduct>;
    async fn insert_price_history(&self, entry: &NewPriceHistory) -> Result<PriceHistoryEntry>;
    async fn list_products(&self, owner: Uuid) -> Result<Vec<TrackedProduct>>;
    /// `None` when the product is missing or belongs to someone else.
    async fn price_history(
        &self,
        owner: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Vec<PriceHistoryEntry>>>;
    /// Returns false when no row owned by `owner` matched.
    async fn delete_product(&self, owner: Uuid, product_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn all_products(&self) -> Result<Vec<TrackedProduct>>;
    async fn refresh_product(&self, product_id: Uuid, refresh: &PriceRefresh) -> Result<()>;
    async fn insert_price_history(&self, entry: &NewPriceHistory) -> Result<PriceHistoryEntry>;
    async fn owner_email(&self, owner: Uuid) -> Result<Option<String>>;
}

// ── PostgreSQL adapters ─────────────────────────────────────────

#[async_trait]
impl ProductStore for Database {
    async fn find_product(&self, owner: Uuid, url: &str) -> Result<Option<TrackedProduct>> {
        Database::find_product(self, owner, url).await
    }

    async fn upsert_product(&self, owner: Uuid, product: &ProductUpsert) -> Result<TrackedProduct> {
        Database::upsert_product(self, owner, product).await
    }

    async fn insert_price_history(&self, entry: &NewPriceHistory) -> Result<PriceHistoryEntry> {
        Database::insert_price_history(self, entry).await
    }

    async fn list_products(&self, owner: Uuid) -> Result<Vec<TrackedProduct>> {
        Database::list_products(self, owner).await
    }

    async fn price_history(
        &self,
        owner: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Vec<PriceHistoryEntry>>> {
        self.get_price_history(product_id, owner).await
    }

    async fn delete_product(&self, owner: Uuid, product_id: Uuid) -> Result<bool> {
        Database::delete_product(self, product_id, owner).await
    }
}

#[async_trait]
impl AdminStore for AdminDatabase {
    async fn all_products(&self) -> Result<Vec<TrackedProduct>> {
        AdminDatabase::all_products(self).await
    }

    async fn refresh_product(&self, product_id: Uuid, refresh: &PriceRefresh) -> Result<()> {
        AdminDatabase::refresh_product(self, product_id, refresh).await
    }

    async fn insert_price_history(&self, entry: &NewPriceHistory) -> Result<PriceHistoryEntry> {
        AdminDatabase::insert_price_history(self, entry).await
    }

    async fn owner_email(&self, owner: Uuid) -> Result<Option<String>> {
        self.get_owner_email(owner).await
    }
}
