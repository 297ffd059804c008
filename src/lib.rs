//! # pricewatch — Product Price Tracking
//!
//! Tracks e-commerce product prices for signed-in users. A user submits a
//! product URL; a scheduled batch job re-checks every tracked product, keeps a
//! price history, and emails the owner when the price drops.
//!
//! ## Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`reconcile`] | Pure decision: stored product + fresh scrape → what to write and whether to alert |
//! | [`batch`] | The price-check job over all products, bounded concurrency, per-item isolation |
//! | [`ingest`] | Single-URL add/update, owner-scoped delete, list and history reads |
//! | [`fetcher`] | Scraping backends (Firecrawl extract API, meta-tag HTML parser) |
//! | [`notifier`] | Price-drop email rendering and delivery (Resend, log-only) |
//! | [`store`] | Store capabilities used by the core, implemented over [`db`] |
//! | [`db`] | PostgreSQL access via sqlx |
//! | [`dashboard`] | Axum HTTP API, cron trigger, activity feeds, WebSocket channel |
//! | [`events`] | In-memory event log, notification feed, WebSocket broadcast |
//! | [`prom_metrics`] | Prometheus registry |
//! | [`config`] | TOML tunables |
//! | [`error`] | Error taxonomy shared by all of the above |

pub mod batch;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod ingest;
pub mod notifier;
pub mod prom_metrics;
pub mod reconcile;
pub mod store;

#[cfg(test)]
mod testing;
