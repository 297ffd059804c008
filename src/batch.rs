//! # Batch — Scheduled Price Check Across All Owners
//!
//! One [`BatchRunner::run`] is one pass over every tracked product:
//!
//! 1. Load all products through the [`AdminStore`] (the only fatal step).
//! 2. For each product, concurrently up to `batch.concurrency`:
//!    fetch → [`reconcile`] → refresh row → append history if the price
//!    changed → alert the owner if the price dropped.
//! 3. Fold every per-product [`ItemOutcome`] into a [`BatchRunReport`].
//!
//! No error crosses a product boundary: each one becomes
//! [`ItemOutcome::Failed`] and the run continues. There is no retry within a
//! run; the next scheduled run is the retry. Every collaborator call runs
//! under its own deadline, so one hung storefront cannot stall the pass.
//!
//! ## Counters
//!
//! | Field | Counts |
//! |-------|--------|
//! | `updated` | products whose row was refreshed (and history written, if due) |
//! | `failed` | products whose fetch, reconcile, or writes failed |
//! | `price_changes` | history entries written |
//! | `price_drops` | drops detected |
//! | `alerts_sent` | alerts the notifier confirmed |
//! | `alerts_failed` | alerts that could not be delivered |
//!
//! Alert failures never touch `updated` or `price_changes`: the writes stand.

use anyhow::anyhow;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::BatchSettings;
use crate::db::TrackedProduct;
use crate::error::{with_timeout, TrackError};
use crate::events::{Event, EventBus};
use crate::fetcher::ProductFetcher;
use crate::notifier::{PriceAlertNotifier, PriceDropAlert};
use crate::reconcile::{reconcile, PriceDrop, ReconciliationDecision};
use crate::store::AdminStore;

/// Aggregate result of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunReport {
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
    pub price_changes: usize,
    pub alerts_sent: usize,
    pub price_drops: usize,
    pub alerts_failed: usize,
}

impl BatchRunReport {
    pub fn message(&self) -> String {
        format!(
            "Price check completed. {} products updated, {} price changes, {} alerts sent",
            self.updated, self.price_changes, self.alerts_sent
        )
    }

    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Updated {
                price_changed,
                alert,
            } => {
                self.updated += 1;
                if *price_changed {
                    self.price_changes += 1;
                }
                if let Some(alert) = alert {
                    self.price_drops += 1;
                    match alert {
                        AlertOutcome::Sent => self.alerts_sent += 1,
                        AlertOutcome::Failed => self.alerts_failed += 1,
                        AlertOutcome::NoRecipient => {}
                    }
                }
            }
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Sent,
    Failed,
    /// Owner has no email on file.
    NoRecipient,
}

/// What happened to one product in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// `alert` is `Some` iff the price dropped.
    Updated {
        price_changed: bool,
        alert: Option<AlertOutcome>,
    },
    Failed {
        reason: String,
    },
}

pub struct BatchRunner {
    admin: Arc<dyn AdminStore>,
    fetcher: Arc<dyn ProductFetcher>,
    notifier: Arc<dyn PriceAlertNotifier>,
    settings: BatchSettings,
    events: Option<Arc<EventBus>>,
}

impl BatchRunner {
    pub fn new(
        admin: Arc<dyn AdminStore>,
        fetcher: Arc<dyn ProductFetcher>,
        notifier: Arc<dyn PriceAlertNotifier>,
        settings: BatchSettings,
    ) -> Self {
        BatchRunner {
            admin,
            fetcher,
            notifier,
            settings,
            events: None,
        }
    }

    /// Publish price drops and the run summary on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub async fn run(&self) -> Result<BatchRunReport, TrackError> {
        let started = Instant::now();
        let products = match self.store_call("load products", self.admin.all_products()).await {
            Ok(p) => p,
            Err(e) => {
                self.emit(Event::Error {
                    context: "price check".into(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        info!(count = products.len(), concurrency = self.settings.concurrency, "price check started");

        let initial = BatchRunReport {
            total: products.len(),
            ..Default::default()
        };
        let report = stream::iter(products)
            .map(|product| async move { self.check_product(&product).await })
            .buffer_unordered(self.settings.concurrency.max(1))
            .fold(initial, |mut report, outcome| async move {
                report.record(&outcome);
                report
            })
            .await;

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            total = report.total,
            updated = report.updated,
            failed = report.failed,
            price_changes = report.price_changes,
            price_drops = report.price_drops,
            alerts_sent = report.alerts_sent,
            alerts_failed = report.alerts_failed,
            elapsed_secs = elapsed,
            "price check completed"
        );
        self.emit(Event::BatchCompleted {
            total: report.total,
            updated: report.updated,
            failed: report.failed,
            price_changes: report.price_changes,
            alerts_sent: report.alerts_sent,
            elapsed_secs: elapsed,
        });
        Ok(report)
    }

    async fn check_product(&self, product: &TrackedProduct) -> ItemOutcome {
        match self.process(product).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(product_id = %product.id, url = %product.url, error = %e, "price check failed for product");
                ItemOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn process(&self, product: &TrackedProduct) -> Result<ItemOutcome, TrackError> {
        let fetch_timeout = self.settings.fetch_timeout();
        let scraped = with_timeout(fetch_timeout, self.fetcher.fetch(&product.url), || {
            TrackError::extraction(format!(
                "fetch timed out after {}s",
                fetch_timeout.as_secs()
            ))
        })
        .await?;
        let decision = reconcile(Some(product), &scraped)?;

        self.store_call(
            "refresh product",
            self.admin.refresh_product(product.id, &decision.refresh()),
        )
        .await?;

        let price_changed = match decision.history_for(product.id) {
            Some(entry) => {
                if let Err(e) = self
                    .store_call("insert history", self.admin.insert_price_history(&entry))
                    .await
                {
                    self.history_lost(product, &decision, &e);
                    return Err(e);
                }
                true
            }
            None => false,
        };

        let alert = match decision.alert {
            Some(price_drop) => Some(self.alert_owner(product, &decision, price_drop).await),
            None => None,
        };

        Ok(ItemOutcome::Updated {
            price_changed,
            alert,
        })
    }

    /// Look up the owner's email and deliver the alert. Never fails the item.
    async fn alert_owner(
        &self,
        product: &TrackedProduct,
        decision: &ReconciliationDecision,
        price_drop: PriceDrop,
    ) -> AlertOutcome {
        self.emit(Event::PriceDropped {
            owner: product.user_id,
            name: product.name.clone(),
            currency: decision.currency.clone(),
            old_price: price_drop.old_price,
            new_price: price_drop.new_price,
        });

        let recipient = match self
            .store_call("owner lookup", self.admin.owner_email(product.user_id))
            .await
        {
            Ok(Some(email)) => email,
            Ok(None) => {
                info!(product_id = %product.id, owner = %product.user_id, "no email on file, skipping alert");
                return AlertOutcome::NoRecipient;
            }
            Err(e) => {
                self.alert_failed(product, &e);
                return AlertOutcome::Failed;
            }
        };

        let alert = PriceDropAlert {
            recipient,
            product_name: product.name.clone(),
            product_url: product.url.clone(),
            image_url: decision.image_url.clone(),
            currency: decision.currency.clone(),
            old_price: price_drop.old_price,
            new_price: price_drop.new_price,
        };
        let sent = with_timeout(
            self.settings.notify_timeout(),
            self.notifier.notify(&alert),
            || TrackError::notify("alert delivery timed out"),
        )
        .await;
        match sent {
            Ok(()) => AlertOutcome::Sent,
            Err(e) => {
                self.alert_failed(product, &e);
                AlertOutcome::Failed
            }
        }
    }

    /// The row already holds the new price, so later runs will not see this
    /// change again.
    fn history_lost(
        &self,
        product: &TrackedProduct,
        decision: &ReconciliationDecision,
        err: &TrackError,
    ) {
        warn!(
            product_id = %product.id,
            price = %decision.current_price,
            currency = %decision.currency,
            error = %err,
            "product refreshed but price history not written"
        );
        self.emit(Event::Warning {
            context: "price history".into(),
            message: format!(
                "{} ({}) now {} {} but the history entry was not written: {}",
                product.name, product.id, decision.currency, decision.current_price, err
            ),
        });
    }

    fn alert_failed(&self, product: &TrackedProduct, err: &TrackError) {
        warn!(product_id = %product.id, error = %err, "price drop alert not delivered");
        self.emit(Event::Warning {
            context: "alert".into(),
            message: format!("{}: {}", product.name, err),
        });
    }

    async fn store_call<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, TrackError> {
        with_timeout(
            self.settings.store_timeout(),
            async { fut.await.map_err(TrackError::from) },
            || TrackError::Store(anyhow!("{} timed out", what)),
        )
        .await
    }

    fn emit(&self, event: Event) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }
}
