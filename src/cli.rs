//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Builds the shared
//! collaborators (database handles, fetcher, notifier) from the CLI secrets
//! and settings, then runs the chosen subcommand.

use anyhow::Result;
use pricewatch::batch::BatchRunner;
use pricewatch::config::Settings;
use pricewatch::db::Database;
use pricewatch::events::EventBus;
use pricewatch::{dashboard, fetcher, ingest, notifier};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::Cli;

// ── Serve ───────────────────────────────────────────────────────

/// Start the HTTP server. Database pools connect lazily so the process comes
/// up before PostgreSQL does; `/readyz` reports when it is reachable.
pub async fn run_serve(cli: &Cli, settings: Settings, port: Option<u16>) -> Result<()> {
    let db = Database::connect_lazy(cli.database_url()?)?;
    let admin = Database::connect_admin_lazy(cli.service_database_url()?)?;
    let fetcher = fetcher::build_fetcher(&settings.fetcher, cli.firecrawl_api_key.as_deref())?;
    let notifier = notifier::build_notifier(&settings.alerts, cli.resend_api_key.as_deref())?;
    let port = port.unwrap_or(settings.server.port);

    let state = dashboard::AppState::new(
        db,
        Arc::new(admin),
        fetcher,
        notifier,
        settings,
        dashboard::Secrets {
            cron_secret: cli.cron_secret.clone(),
            jwt_secret: cli.jwt_secret.clone(),
        },
    );
    dashboard::run(state, port).await
}

// ── Check ───────────────────────────────────────────────────────

/// Run one batch price check and print the report as JSON on stdout.
pub async fn run_check(cli: &Cli, settings: Settings) -> Result<()> {
    let service_url = cli.service_database_url()?;
    let fetcher = fetcher::build_fetcher(&settings.fetcher, cli.firecrawl_api_key.as_deref())?;
    let notifier = notifier::build_notifier(&settings.alerts, cli.resend_api_key.as_deref())?;
    let admin = Database::connect_admin(service_url).await?;

    let report = BatchRunner::new(Arc::new(admin), fetcher, notifier, settings.batch)
        .run()
        .await?;
    info!("{}", report.message());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ── Track ───────────────────────────────────────────────────────

/// Ingest one URL for `owner` and print the stored product.
pub async fn run_track(cli: &Cli, settings: Settings, owner: Uuid, url: &str) -> Result<()> {
    let database_url = cli.database_url()?;
    let fetcher = fetcher::build_fetcher(&settings.fetcher, cli.firecrawl_api_key.as_deref())?;
    let db = Database::connect(database_url).await?;
    let events = EventBus::new();

    let added =
        ingest::add_tracked_product(&settings.batch, &db, &*fetcher, &events, Some(owner), url)
            .await
            .map_err(|f| anyhow::anyhow!("{}", f.message))?;
    info!("{}", added.message);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "created": added.created,
            "priceChanged": added.price_changed,
            "product": added.product,
        }))?
    );
    Ok(())
}
