//! Price history operations.
//!
//! `price_history` is append-only: rows are inserted when a price is first
//! observed or changes, and only disappear through the product's cascade.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AdminDatabase, Database, NewPriceHistory, PriceHistoryEntry};

async fn insert_entry(pool: &PgPool, entry: &NewPriceHistory) -> Result<PriceHistoryEntry> {
    let row = sqlx::query_as::<_, PriceHistoryEntry>(
        "INSERT INTO price_history (product_id, price, currency)
         VALUES ($1, $2, $3)
         RETURNING id, product_id, price, currency, checked_at",
    )
    .bind(entry.product_id)
    .bind(entry.price)
    .bind(&entry.currency)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

impl Database {
    pub async fn insert_price_history(&self, entry: &NewPriceHistory) -> Result<PriceHistoryEntry> {
        insert_entry(&self.pool, entry).await
    }

    /// History for one of the caller's products, oldest observation first.
    /// Returns `None` when the product does not exist or is not theirs.
    pub async fn get_price_history(
        &self,
        product_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Vec<PriceHistoryEntry>>> {
        if !self.product_owned_by(product_id, user_id).await? {
            return Ok(None);
        }
        let rows = sqlx::query_as::<_, PriceHistoryEntry>(
            "SELECT id, product_id, price, currency, checked_at
             FROM price_history WHERE product_id = $1
             ORDER BY checked_at ASC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(rows))
    }
}

impl AdminDatabase {
    pub async fn insert_price_history(&self, entry: &NewPriceHistory) -> Result<PriceHistoryEntry> {
        insert_entry(&self.pool, entry).await
    }
}
