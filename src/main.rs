//! # Main — CLI Entry Point
//!
//! Routes CLI subcommands to the server, the one-shot batch check, and the
//! operator ingest tool. Handles shared concerns: `.env` loading, logging,
//! settings, and connection strings.
//!
//! ## Subcommands
//!
//! - `serve`: run the HTTP API and cron trigger.
//! - `check`: run one batch price check and print the report (for an external
//!   timer such as a Kubernetes CronJob).
//! - `track`: add or refresh a product URL on behalf of an owner.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: user-scoped PostgreSQL connection.
//! - `--service-database-url` / `SERVICE_DATABASE_URL`: administrative
//!   connection for the batch job (defaults to `DATABASE_URL`).
//! - `--config`: TOML file with batch, fetcher, alert, and server tunables.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "pricewatch", about = "Track product prices and alert on drops")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Service-role PostgreSQL URL for the batch job (defaults to DATABASE_URL)
    #[arg(long, env = "SERVICE_DATABASE_URL")]
    service_database_url: Option<String>,

    /// Shared secret expected on the cron trigger
    #[arg(long, env = "CRON_SECRET", hide_env_values = true)]
    cron_secret: Option<String>,

    /// HS256 key for verifying Supabase JWTs
    #[arg(long, env = "SUPABASE_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// API key for the Firecrawl extraction backend
    #[arg(long, env = "FIRECRAWL_API_KEY", hide_env_values = true)]
    firecrawl_api_key: Option<String>,

    /// API key for Resend email delivery (alerts are only logged when unset)
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    resend_api_key: Option<String>,

    /// Path to a TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and cron trigger
    Serve {
        /// Port to listen on (overrides [server] port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one batch price check over every tracked product
    Check,
    /// Add or refresh a product URL for an owner
    Track {
        /// Owner (Supabase user id)
        #[arg(long)]
        owner: Uuid,
        /// Product page URL
        url: String,
    },
}

impl Cli {
    fn database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)")
        })
    }

    fn service_database_url(&self) -> Result<&str> {
        match self.service_database_url.as_deref() {
            Some(url) => Ok(url),
            None => self.database_url(),
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for K8s, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let settings = pricewatch::config::Settings::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    match &cli.command {
        Commands::Serve { port } => rt.block_on(cli::run_serve(&cli, settings, *port)),
        Commands::Check => rt.block_on(cli::run_check(&cli, settings)),
        Commands::Track { owner, url } => rt.block_on(cli::run_track(&cli, settings, *owner, url)),
    }
}
