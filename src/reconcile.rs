//! # Reconcile — Stored vs Freshly Scraped Price
//!
//! Pure decision function shared by the batch price check and the ingestion
//! path. Given the stored product (if any) and a fresh [`ScrapeResult`], it
//! decides which writes the caller must perform:
//!
//! | Situation | Product row | History entry | Alert |
//! |-----------|-------------|---------------|-------|
//! | No stored product | write | yes (first observation) | no |
//! | Price unchanged | write (timestamp refresh) | no | no |
//! | Price went up | write | yes | no |
//! | Price went down | write | yes | yes |
//!
//! Scraped prices are first rounded to [`PRICE_SCALE`] decimals, the scale of
//! the price columns, so a stored price always equals the scrape it came
//! from. After that, prices compare by exact decimal equality. Currency or image changes on
//! their own never produce history or alerts. The scraped currency wins; when
//! the scrape has none the result is [`DEFAULT_CURRENCY`], even if the stored
//! product carried a different code.

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::db::{NewPriceHistory, PriceRefresh, ProductUpsert, TrackedProduct};
use crate::error::TrackError;
use crate::fetcher::ScrapeResult;

pub const DEFAULT_CURRENCY: &str = "BDT";

/// Decimal places kept for prices; matches `NUMERIC(18, 4)` in the schema.
pub const PRICE_SCALE: u32 = 4;

/// Round a price the way PostgreSQL stores it (half away from zero) and drop
/// trailing zeros.
pub fn storage_price(price: Decimal) -> Decimal {
    price
        .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Old and new price of a detected drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceDrop {
    pub old_price: Decimal,
    pub new_price: Decimal,
}

/// What to write for one product after a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationDecision {
    pub name: String,
    pub current_price: Decimal,
    pub currency: String,
    pub image_url: Option<String>,
    pub is_new_or_changed: bool,
    pub is_price_drop: bool,
    /// Present iff `is_price_drop`.
    pub alert: Option<PriceDrop>,
}

impl ReconciliationDecision {
    pub fn record_history(&self) -> bool {
        self.is_new_or_changed
    }

    /// Row values for an ingestion upsert keyed on (owner, `url`).
    pub fn upsert_for(&self, url: &str) -> ProductUpsert {
        ProductUpsert {
            url: url.to_string(),
            name: self.name.clone(),
            current_price: self.current_price,
            currency: self.currency.clone(),
            image_url: self.image_url.clone(),
        }
    }

    /// Row values for a batch refresh of an existing product.
    pub fn refresh(&self) -> PriceRefresh {
        PriceRefresh {
            current_price: self.current_price,
            currency: self.currency.clone(),
            image_url: self.image_url.clone(),
        }
    }

    /// The history entry to append, if any.
    pub fn history_for(&self, product_id: Uuid) -> Option<NewPriceHistory> {
        self.record_history().then(|| NewPriceHistory {
            product_id,
            price: self.current_price,
            currency: self.currency.clone(),
        })
    }
}

/// Trim and upper-case a scraped currency code, falling back to the default.
pub fn normalize_currency(code: Option<&str>) -> String {
    match code.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_ascii_uppercase(),
        _ => DEFAULT_CURRENCY.to_string(),
    }
}

pub fn reconcile(
    existing: Option<&TrackedProduct>,
    scraped: &ScrapeResult,
) -> Result<ReconciliationDecision, TrackError> {
    let name = scraped.product_name.trim();
    if name.is_empty() {
        return Err(TrackError::extraction("scraped data has no product name"));
    }
    let price = scraped
        .current_price
        .map(storage_price)
        .ok_or_else(|| TrackError::extraction("scraped data has no price"))?;
    if price < Decimal::ZERO {
        return Err(TrackError::extraction(format!(
            "scraped price is negative: {}",
            price
        )));
    }

    let is_new_or_changed = existing.map_or(true, |p| p.current_price != price);
    let is_price_drop = existing.is_some_and(|p| price < p.current_price);
    let alert = existing.filter(|_| is_price_drop).map(|p| PriceDrop {
        old_price: p.current_price,
        new_price: price,
    });

    Ok(ReconciliationDecision {
        name: name.to_string(),
        current_price: price,
        currency: normalize_currency(scraped.currency_code.as_deref()),
        image_url: scraped
            .product_image_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string),
        is_new_or_changed,
        is_price_drop,
        alert,
    })
}
