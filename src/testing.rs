//! In-memory fakes for the store, fetcher, notifier and view-refresh seams.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::db::{
    NewPriceHistory, PriceHistoryEntry, PriceRefresh, ProductUpsert, TrackedProduct,
};
use crate::error::TrackError;
use crate::fetcher::{ProductFetcher, ScrapeResult};
use crate::ingest::ViewRefresh;
use crate::notifier::{PriceAlertNotifier, PriceDropAlert};
use crate::store::{AdminStore, ProductStore};

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn product(price: &str) -> TrackedProduct {
    product_for(Uuid::new_v4(), "https://shop.example/item", price)
}

pub fn product_for(owner: Uuid, url: &str, price: &str) -> TrackedProduct {
    let now = chrono::Utc::now();
    TrackedProduct {
        id: Uuid::new_v4(),
        user_id: owner,
        url: url.to_string(),
        name: "Stored name".into(),
        current_price: dec(price),
        currency: "BDT".into(),
        image_url: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn scrape(name: &str, price: &str, currency: Option<&str>) -> ScrapeResult {
    ScrapeResult {
        product_name: name.to_string(),
        current_price: Some(dec(price)),
        currency_code: currency.map(str::to_string),
        product_image_url: None,
    }
}

fn history_row(entry: &NewPriceHistory) -> PriceHistoryEntry {
    PriceHistoryEntry {
        id: Uuid::new_v4(),
        product_id: entry.product_id,
        price: entry.price,
        currency: entry.currency.clone(),
        checked_at: chrono::Utc::now(),
    }
}

// ── Fetcher ─────────────────────────────────────────────────────

/// Scripted fetcher: per-URL result and optional delay.
#[derive(Default)]
pub struct FakeFetcher {
    results: Mutex<HashMap<String, Result<ScrapeResult, String>>>,
    delays: Mutex<HashMap<String, Duration>>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, result: ScrapeResult) -> Self {
        self.results.lock().unwrap().insert(url.to_string(), Ok(result));
        self
    }

    pub fn failing(self, url: &str, message: &str) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(message.to_string()));
        self
    }

    pub fn slow(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }
}

#[async_trait]
impl ProductFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<ScrapeResult, TrackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let result = self.results.lock().unwrap().get(url).cloned();
        match result {
            Some(Ok(r)) => Ok(r),
            Some(Err(msg)) => Err(TrackError::extraction(msg)),
            None => Err(TrackError::extraction(format!("no fake result for {}", url))),
        }
    }
}

// ── Admin store ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAdminStore {
    pub products: Mutex<Vec<TrackedProduct>>,
    pub history: Mutex<Vec<NewPriceHistory>>,
    pub emails: Mutex<HashMap<Uuid, String>>,
    pub fail_load: bool,
    pub fail_refresh: Mutex<HashSet<Uuid>>,
    pub fail_history: bool,
}

impl FakeAdminStore {
    pub fn with_products(products: Vec<TrackedProduct>) -> Self {
        FakeAdminStore {
            products: Mutex::new(products),
            ..Default::default()
        }
    }

    pub fn set_email(&self, owner: Uuid, email: &str) {
        self.emails.lock().unwrap().insert(owner, email.to_string());
    }

    pub fn price_of(&self, id: Uuid) -> Decimal {
        self.products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.current_price)
            .unwrap()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

#[async_trait]
impl AdminStore for FakeAdminStore {
    async fn all_products(&self) -> Result<Vec<TrackedProduct>> {
        if self.fail_load {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.products.lock().unwrap().clone())
    }

    async fn refresh_product(&self, product_id: Uuid, refresh: &PriceRefresh) -> Result<()> {
        if self.fail_refresh.lock().unwrap().contains(&product_id) {
            return Err(anyhow!("update failed for {}", product_id));
        }
        let mut products = self.products.lock().unwrap();
        let row = products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| anyhow!("no product {}", product_id))?;
        row.current_price = refresh.current_price;
        row.currency = refresh.currency.clone();
        row.image_url = refresh.image_url.clone();
        row.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn insert_price_history(&self, entry: &NewPriceHistory) -> Result<PriceHistoryEntry> {
        if self.fail_history {
            return Err(anyhow!("history insert rejected"));
        }
        self.history.lock().unwrap().push(entry.clone());
        Ok(history_row(entry))
    }

    async fn owner_email(&self, owner: Uuid) -> Result<Option<String>> {
        Ok(self.emails.lock().unwrap().get(&owner).cloned())
    }
}

// ── User-scoped store ───────────────────────────────────────────

#[derive(Default)]
pub struct FakeProductStore {
    pub products: Mutex<Vec<TrackedProduct>>,
    pub history: Mutex<Vec<PriceHistoryEntry>>,
    pub fail_writes: bool,
    /// Applied to every lookup.
    pub delay: Option<Duration>,
}

impl FakeProductStore {
    pub fn with_products(products: Vec<TrackedProduct>) -> Self {
        FakeProductStore {
            products: Mutex::new(products),
            ..Default::default()
        }
    }

    pub fn product_count(&self) -> usize {
        self.products.lock().unwrap().len()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

#[async_trait]
impl ProductStore for FakeProductStore {
    async fn find_product(&self, owner: Uuid, url: &str) -> Result<Option<TrackedProduct>> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.user_id == owner && p.url == url)
            .cloned())
    }

    async fn upsert_product(&self, owner: Uuid, up: &ProductUpsert) -> Result<TrackedProduct> {
        if self.fail_writes {
            return Err(anyhow!("write rejected"));
        }
        let mut products = self.products.lock().unwrap();
        let now = chrono::Utc::now();
        if let Some(row) = products
            .iter_mut()
            .find(|p| p.user_id == owner && p.url == up.url)
        {
            row.name = up.name.clone();
            row.current_price = up.current_price;
            row.currency = up.currency.clone();
            row.image_url = up.image_url.clone();
            row.updated_at = now;
            return Ok(row.clone());
        }
        let row = TrackedProduct {
            id: Uuid::new_v4(),
            user_id: owner,
            url: up.url.clone(),
            name: up.name.clone(),
            current_price: up.current_price,
            currency: up.currency.clone(),
            image_url: up.image_url.clone(),
            created_at: now,
            updated_at: now,
        };
        products.push(row.clone());
        Ok(row)
    }

    async fn insert_price_history(&self, entry: &NewPriceHistory) -> Result<PriceHistoryEntry> {
        let row = history_row(entry);
        self.history.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn list_products(&self, owner: Uuid) -> Result<Vec<TrackedProduct>> {
        let mut rows: Vec<_> = self
            .products
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn price_history(
        &self,
        owner: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Vec<PriceHistoryEntry>>> {
        let owned = self
            .products
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.id == product_id && p.user_id == owner);
        if !owned {
            return Ok(None);
        }
        let mut rows: Vec<_> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.product_id == product_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.checked_at.cmp(&b.checked_at));
        Ok(Some(rows))
    }

    async fn delete_product(&self, owner: Uuid, product_id: Uuid) -> Result<bool> {
        if self.fail_writes {
            return Err(anyhow!("write rejected"));
        }
        let mut products = self.products.lock().unwrap();
        let before = products.len();
        products.retain(|p| !(p.id == product_id && p.user_id == owner));
        let deleted = products.len() < before;
        if deleted {
            self.history
                .lock()
                .unwrap()
                .retain(|h| h.product_id != product_id);
        }
        Ok(deleted)
    }
}

// ── Notifier ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<PriceDropAlert>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl FakeNotifier {
    pub fn failing() -> Self {
        FakeNotifier {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PriceAlertNotifier for FakeNotifier {
    async fn notify(&self, alert: &PriceDropAlert) -> Result<(), TrackError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            return Err(TrackError::notify("mailbox unavailable"));
        }
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

// ── View refresh ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingRefresh {
    pub owners: Mutex<Vec<Option<Uuid>>>,
}

impl RecordingRefresh {
    pub fn count(&self) -> usize {
        self.owners.lock().unwrap().len()
    }
}

impl ViewRefresh for RecordingRefresh {
    fn refresh_view(&self, owner: Option<Uuid>) {
        self.owners.lock().unwrap().push(owner);
    }
}
