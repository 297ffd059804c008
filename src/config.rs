//! TOML settings: batch tuning, fetcher backend, alert email, server.
//!
//! Secrets and connection strings come from the CLI / environment (see
//! `main.rs`); everything here is optional and falls back to defaults, so a
//! missing `--config` file is equivalent to an empty one.
//!
//! ```toml
//! [batch]
//! concurrency = 4
//! fetch_timeout_secs = 90
//!
//! [fetcher]
//! backend = "meta"
//!
//! [alerts]
//! from_address = "Deals <alerts@example.com>"
//! app_url = "https://deals.example.com"
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest accepted `batch.concurrency`.
pub const MAX_CONCURRENCY: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub fetcher: FetcherSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// The `[batch]` section: worker pool size and per-call deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub notify_timeout_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            concurrency: 4,
            fetch_timeout_secs: 90,
            store_timeout_secs: 10,
            notify_timeout_secs: 15,
        }
    }
}

impl BatchSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherBackend {
    #[default]
    Firecrawl,
    Meta,
}

/// The `[fetcher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    pub backend: FetcherBackend,
    pub firecrawl_base_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        FetcherSettings {
            backend: FetcherBackend::Firecrawl,
            firecrawl_base_url: "https://api.firecrawl.dev".to_string(),
            poll_interval_ms: 2000,
            request_timeout_secs: 30,
            user_agent: concat!("pricewatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// The `[alerts]` section: how price-drop emails are addressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub from_address: String,
    pub app_url: String,
    pub resend_base_url: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            from_address: "Price Tracker <alerts@pricewatch.dev>".to_string(),
            app_url: "http://localhost:3000".to_string(),
            resend_base_url: "https://api.resend.com".to_string(),
        }
    }
}

/// The `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    /// Request deadline for every route. The price-check trigger runs the
    /// whole batch inside the request, so this must cover a full run.
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            port: 7001,
            request_timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("invalid settings in {}", p.display()))?
            }
            None => Settings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.batch;
        if b.concurrency == 0 || b.concurrency > MAX_CONCURRENCY {
            bail!(
                "batch.concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY,
                b.concurrency
            );
        }
        if b.fetch_timeout_secs == 0 || b.store_timeout_secs == 0 || b.notify_timeout_secs == 0 {
            bail!("batch timeouts must be greater than zero");
        }
        if self.fetcher.request_timeout_secs == 0 {
            bail!("fetcher.request_timeout_secs must be greater than zero");
        }
        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let s = Settings::from_toml_str("").unwrap();
        assert_eq!(s.batch.concurrency, 4);
        assert_eq!(s.batch.fetch_timeout_secs, 90);
        assert_eq!(s.fetcher.backend, FetcherBackend::Firecrawl);
        assert_eq!(s.server.port, 7001);
        s.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let s = Settings::from_toml_str(
            r#"
            [batch]
            concurrency = 8

            [fetcher]
            backend = "meta"
            "#,
        )
        .unwrap();
        assert_eq!(s.batch.concurrency, 8);
        assert_eq!(s.batch.store_timeout_secs, 10);
        assert_eq!(s.fetcher.backend, FetcherBackend::Meta);
        assert_eq!(s.fetcher.poll_interval_ms, 2000);
        assert_eq!(s.alerts.resend_base_url, "https://api.resend.com");
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(Settings::from_toml_str("[fetcher]\nbackend = \"selenium\"").is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_concurrency() {
        for bad in [0, MAX_CONCURRENCY + 1] {
            let mut s = Settings::default();
            s.batch.concurrency = bad;
            assert!(s.validate().is_err(), "concurrency {} should be rejected", bad);
        }
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut s = Settings::default();
        s.batch.notify_timeout_secs = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[alerts]\napp_url = \"https://deals.example.com\"").unwrap();
        let s = Settings::load(Some(file.path())).unwrap();
        assert_eq!(s.alerts.app_url, "https://deals.example.com");
    }

    #[test]
    fn load_without_path_is_default() {
        let s = Settings::load(None).unwrap();
        assert_eq!(s.batch.concurrency, BatchSettings::default().concurrency);
    }

    #[test]
    fn load_missing_file_is_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/pricewatch.toml"))).is_err());
    }
}
