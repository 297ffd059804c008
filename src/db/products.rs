//! Tracked product queries — upsert, lookup, listing, delete.
//!
//! Products are upserted on (user_id, url) so resubmitting a URL refreshes
//! the existing row rather than creating a duplicate. Every user-facing query
//! filters on the owner; the cross-owner reads live on [`AdminDatabase`].

use anyhow::Result;
use uuid::Uuid;

use super::{AdminDatabase, Database, PriceRefresh, ProductUpsert, TrackedProduct};

const PRODUCT_COLUMNS: &str =
    "id, user_id, url, name, current_price, currency, image_url, created_at, updated_at";

impl Database {
    /// Look up the caller's product for a URL.
    pub async fn find_product(&self, user_id: Uuid, url: &str) -> Result<Option<TrackedProduct>> {
        let row = sqlx::query_as::<_, TrackedProduct>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE user_id = $1 AND url = $2"
        ))
        .bind(user_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert or overwrite the (user_id, url) row with the latest scraped values.
    pub async fn upsert_product(
        &self,
        user_id: Uuid,
        product: &ProductUpsert,
    ) -> Result<TrackedProduct> {
        let row = sqlx::query_as::<_, TrackedProduct>(&format!(
            "INSERT INTO products (user_id, url, name, current_price, currency, image_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id, url) DO UPDATE SET
               name = EXCLUDED.name,
               current_price = EXCLUDED.current_price,
               currency = EXCLUDED.currency,
               image_url = EXCLUDED.image_url,
               updated_at = NOW()
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&product.url)
        .bind(&product.name)
        .bind(product.current_price)
        .bind(&product.currency)
        .bind(product.image_url.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// The caller's products, newest first.
    pub async fn list_products(&self, user_id: Uuid) -> Result<Vec<TrackedProduct>> {
        let rows = sqlx::query_as::<_, TrackedProduct>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// True if `product_id` exists and belongs to `user_id`.
    pub async fn product_owned_by(&self, product_id: Uuid, user_id: Uuid) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM products WHERE id = $1 AND user_id = $2",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Delete the caller's product. Returns false when no owned row matched.
    /// History rows go with it via `ON DELETE CASCADE`.
    pub async fn delete_product(&self, product_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND user_id = $2")
            .bind(product_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl AdminDatabase {
    /// Every tracked product across all owners, oldest first.
    pub async fn all_products(&self) -> Result<Vec<TrackedProduct>> {
        let rows = sqlx::query_as::<_, TrackedProduct>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Write a re-checked price onto an existing product.
    pub async fn refresh_product(&self, product_id: Uuid, refresh: &PriceRefresh) -> Result<()> {
        sqlx::query(
            "UPDATE products SET
               current_price = $2,
               currency = $3,
               image_url = $4,
               updated_at = NOW()
             WHERE id = $1",
        )
        .bind(product_id)
        .bind(refresh.current_price)
        .bind(&refresh.currency)
        .bind(refresh.image_url.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
