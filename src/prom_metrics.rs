//! # Prometheus Metrics — Exposition for Scrapers
//!
//! Exposes pricewatch operational metrics in the OpenMetrics text format for
//! scraping by Prometheus, Grafana Agent, or any compatible collector.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `pricewatch_batch_runs_total` | Counter | `result` | Batch price checks started (`ok` / `error`) |
//! | `pricewatch_products_checked_total` | Counter | `outcome` | Products processed (`updated` / `failed`) |
//! | `pricewatch_price_changes_total` | Counter | — | History entries written by batch runs |
//! | `pricewatch_price_drops_total` | Counter | — | Price drops detected |
//! | `pricewatch_alerts_sent_total` | Counter | — | Drop alerts confirmed delivered |
//! | `pricewatch_last_batch_duration_seconds` | Gauge | — | Wall time of the latest batch run |
//! | `pricewatch_http_request_duration_seconds` | Histogram | `method`, `path` | HTTP latency |
//!
//! ## Integration
//!
//! Batch counters are updated after every run triggered through the server.
//! The `/metrics` endpoint renders the current registry state on each scrape.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use crate::batch::BatchRunReport;

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct ResultLabel {
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct OutcomeLabel {
    pub outcome: String,
}

/// Label set for per-route HTTP latency.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

type HistogramFamily = Family<HttpLabel, Histogram, fn() -> Histogram>;

/// Thread-safe metrics registry.
///
/// All fields use atomic types and are safe to update from any async task.
pub struct Metrics {
    pub registry: Registry,
    pub batch_runs: Family<ResultLabel, Counter>,
    pub products_checked: Family<OutcomeLabel, Counter>,
    pub price_changes: Counter,
    pub price_drops: Counter,
    pub alerts_sent: Counter,
    pub last_batch_duration: Gauge<f64, AtomicU64>,
    pub http_request_duration: HistogramFamily,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let batch_runs = Family::<ResultLabel, Counter>::default();
        registry.register(
            "pricewatch_batch_runs",
            "Batch price checks by result",
            batch_runs.clone(),
        );

        let products_checked = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "pricewatch_products_checked",
            "Products processed by batch price checks, by outcome",
            products_checked.clone(),
        );

        let price_changes = Counter::default();
        registry.register(
            "pricewatch_price_changes",
            "Price history entries written by batch price checks",
            price_changes.clone(),
        );

        let price_drops = Counter::default();
        registry.register(
            "pricewatch_price_drops",
            "Price drops detected by batch price checks",
            price_drops.clone(),
        );

        let alerts_sent = Counter::default();
        registry.register(
            "pricewatch_alerts_sent",
            "Price drop alerts confirmed delivered",
            alerts_sent.clone(),
        );

        let last_batch_duration = Gauge::<f64, AtomicU64>::default();
        registry.register(
            "pricewatch_last_batch_duration_seconds",
            "Wall time of the most recent batch price check",
            last_batch_duration.clone(),
        );

        let http_request_duration =
            HistogramFamily::new_with_constructor(|| Histogram::new(exponential_buckets(0.005, 2.0, 14)));
        registry.register(
            "pricewatch_http_request_duration_seconds",
            "HTTP request latency by method and path",
            http_request_duration.clone(),
        );

        Self {
            registry,
            batch_runs,
            products_checked,
            price_changes,
            price_drops,
            alerts_sent,
            last_batch_duration,
            http_request_duration,
        }
    }

    /// Fold a finished batch run into the counters.
    pub fn record_batch(&self, report: &BatchRunReport, elapsed: Duration) {
        self.batch_runs.get_or_create(&result("ok")).inc();
        self.products_checked
            .get_or_create(&outcome("updated"))
            .inc_by(report.updated as u64);
        self.products_checked
            .get_or_create(&outcome("failed"))
            .inc_by(report.failed as u64);
        self.price_changes.inc_by(report.price_changes as u64);
        self.price_drops.inc_by(report.price_drops as u64);
        self.alerts_sent.inc_by(report.alerts_sent as u64);
        self.last_batch_duration.set(elapsed.as_secs_f64());
    }

    /// A run that could not load its products.
    pub fn record_batch_error(&self) {
        self.batch_runs.get_or_create(&result("error")).inc();
    }

    /// Render all metrics in OpenMetrics text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).expect("encoding metrics should not fail");
        buf
    }
}

fn result(value: &str) -> ResultLabel {
    ResultLabel {
        result: value.to_string(),
    }
}

fn outcome(value: &str) -> OutcomeLabel {
    OutcomeLabel {
        outcome: value.to_string(),
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
