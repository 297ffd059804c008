//! # Database — PostgreSQL Storage Layer
//!
//! Provides async database operations for tracked products, their price
//! history, and owner contact lookup via `sqlx::PgPool` connecting to
//! Supabase PostgreSQL.
//!
//! ## Schema
//!
//! - `products`: one row per (user_id, url), current price, currency, image
//! - `price_history`: append-only price observations, cascades with product
//! - `user_profiles`: owner contact details (email) for price-drop alerts
//!
//! ## Module Structure
//!
//! - [`products`] — Product upsert, lookup, listing, owner-scoped delete
//! - [`price_history`] — History append and ordered reads
//! - [`user_profiles`] — Owner email lookup for alerts
//!
//! ## Access Levels
//!
//! [`Database`] connects with the user-facing credentials and every query it
//! issues filters on the owner. [`AdminDatabase`] wraps a pool opened with the
//! service credentials (bypasses row-level security) and is the only handle
//! that can read across all owners. It is constructed explicitly by
//! [`Database::connect_admin`] and handed to the batch runner.

mod price_history;
mod products;
mod user_profiles;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use uuid::Uuid;

// ── Product types ───────────────────────────────────────────────

/// A (user, URL) pair under price monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TrackedProduct {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    pub currency: String,
    pub image_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Values written by an ingestion upsert, keyed on (owner, url).
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUpsert {
    pub url: String,
    pub name: String,
    pub current_price: Decimal,
    pub currency: String,
    pub image_url: Option<String>,
}

/// Values written when the batch job refreshes an existing product.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRefresh {
    pub current_price: Decimal,
    pub currency: String,
    pub image_url: Option<String>,
}

// ── History types ───────────────────────────────────────────────

/// An immutable price observation.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PriceHistoryEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub currency: String,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceHistory {
    pub product_id: Uuid,
    pub price: Decimal,
    pub currency: String,
}

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Service-credential handle that reads and writes across all owners.
#[derive(Clone)]
pub struct AdminDatabase {
    pool: PgPool,
}

/// Parse a connection URL into options.
///
/// Manually parses the URL to preserve the full username — sqlx's built-in
/// parser strips the ".project-ref" suffix that Supabase pooler requires.
fn connect_options(database_url: &str) -> Result<PgConnectOptions> {
    let url = url::Url::parse(database_url)?;
    let username = urlencoding::decode(url.username())?.into_owned();
    let password = url
        .password()
        .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
        .transpose()?;
    let mut opts = PgConnectOptions::new()
        .host(url.host_str().unwrap_or("localhost"))
        .port(url.port().unwrap_or(5432))
        .database(url.path().trim_start_matches('/'))
        .username(&username)
        .statement_cache_capacity(0);
    if let Some(ref pw) = password {
        opts = opts.password(pw);
    }
    Ok(opts)
}

impl Database {
    /// Connect to PostgreSQL with the user-facing credentials.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(connect_options(database_url)?)
            .await?;
        Ok(Database { pool })
    }

    /// Build a pool that defers connecting until the first query.
    ///
    /// Lets the server (and router tests) start before the database is reachable;
    /// `/readyz` reports the real state.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_lazy_with(connect_options(database_url)?);
        Ok(Database { pool })
    }

    /// Connect with the service credentials used by the batch price check.
    pub async fn connect_admin(service_database_url: &str) -> Result<AdminDatabase> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect_with(connect_options(service_database_url)?)
            .await?;
        Ok(AdminDatabase { pool })
    }

    /// Lazy variant of [`Database::connect_admin`].
    pub fn connect_admin_lazy(service_database_url: &str) -> Result<AdminDatabase> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_lazy_with(connect_options(service_database_url)?);
        Ok(AdminDatabase { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    ///
    /// Used by the `/readyz` readiness probe.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

impl AdminDatabase {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ── Tests ───────────────────────────────────────────────────────
