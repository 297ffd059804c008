//! # Fetcher — Product Data Extraction
//!
//! Turns a product URL into a [`ScrapeResult`] (name, price, currency, image).
//! The core only depends on the [`ProductFetcher`] contract; two adapters are
//! provided:
//!
//! - [`FirecrawlFetcher`]: Firecrawl's `/v1/extract` LLM extraction API. The
//!   extract call is asynchronous on Firecrawl's side, so a response carrying
//!   only a job `id` is polled until it completes or fails.
//! - [`MetaTagFetcher`]: plain HTTP GET plus OpenGraph / schema.org tag
//!   parsing with `scraper`. No API key needed; works for storefronts that
//!   publish `product:price:amount` or `itemprop="price"`.
//!
//! Every failure (transport, provider error, missing name) surfaces as
//! [`TrackError::Extraction`]. Prices are parsed into exact decimals; commas
//! are treated as thousands separators and currency symbols are stripped.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{FetcherBackend, FetcherSettings};
use crate::error::TrackError;

/// Structured product data produced by a fetch. Transient.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrapeResult {
    pub product_name: String,
    pub current_price: Option<Decimal>,
    pub currency_code: Option<String>,
    pub product_image_url: Option<String>,
}

#[async_trait]
pub trait ProductFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ScrapeResult, TrackError>;
}

/// Build the configured fetcher backend.
pub fn build_fetcher(
    settings: &FetcherSettings,
    firecrawl_api_key: Option<&str>,
) -> anyhow::Result<Arc<dyn ProductFetcher>> {
    let client = reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?;
    match settings.backend {
        FetcherBackend::Firecrawl => {
            let key = firecrawl_api_key.ok_or_else(|| {
                anyhow::anyhow!("FIRECRAWL_API_KEY is required for the firecrawl fetcher backend")
            })?;
            Ok(Arc::new(FirecrawlFetcher::new(
                client,
                &settings.firecrawl_base_url,
                key,
                Duration::from_millis(settings.poll_interval_ms),
            )))
        }
        FetcherBackend::Meta => Ok(Arc::new(MetaTagFetcher::new(client))),
    }
}

// ── Price parsing ───────────────────────────────────────────────

/// Parse a human-formatted price ("৳ 1,299.00", "$19.99", "1299") into a decimal.
pub fn parse_price_text(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Decimal::from_str(cleaned).ok()
}

/// Parse a JSON price that may be a number or a formatted string.
pub fn parse_price_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => parse_price_text(s),
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ── Firecrawl ───────────────────────────────────────────────────

const EXTRACT_PROMPT: &str = "Extract the product name as 'productName', current price as a number as 'currentPrice', currency code (USD, EUR, etc) as 'currencyCode', and product image URL as 'productImageUrl' if available. The currency code must be an ISO code like USD, BDT or INR, not a symbol.";

/// Upper bound on status polls for one extraction job.
const MAX_EXTRACT_POLLS: u32 = 120;

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    success: bool,
    id: Option<String>,
    status: Option<String>,
    data: Option<RawExtract>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtract {
    product_name: Option<String>,
    current_price: Option<Value>,
    currency_code: Option<String>,
    product_image_url: Option<String>,
}

impl RawExtract {
    fn has_content(&self) -> bool {
        self.product_name.is_some() || self.current_price.is_some()
    }

    fn into_scrape_result(self) -> Result<ScrapeResult, TrackError> {
        let product_name = non_blank(self.product_name)
            .ok_or_else(|| TrackError::extraction("No data extracted from URL"))?;
        Ok(ScrapeResult {
            product_name,
            current_price: self.current_price.as_ref().and_then(parse_price_value),
            currency_code: non_blank(self.currency_code),
            product_image_url: non_blank(self.product_image_url),
        })
    }
}

pub struct FirecrawlFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
}

impl FirecrawlFetcher {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        poll_interval: Duration,
    ) -> Self {
        FirecrawlFetcher {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            poll_interval,
        }
    }

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "productName": { "type": "string" },
                "currentPrice": { "type": "number" },
                "currencyCode": { "type": "string" },
                "productImageUrl": { "type": "string" },
            },
            "required": ["productName", "currentPrice"],
        })
    }

    async fn start_extract(&self, url: &str) -> Result<ExtractResponse, TrackError> {
        let body = serde_json::json!({
            "urls": [url],
            "prompt": EXTRACT_PROMPT,
            "schema": Self::schema(),
        });
        let response = self
            .client
            .post(format!("{}/v1/extract", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(scrape_failure)?;
        read_extract_response(response).await
    }

    async fn poll_extract(&self, job_id: &str) -> Result<ExtractResponse, TrackError> {
        let response = self
            .client
            .get(format!("{}/v1/extract/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(scrape_failure)?;
        read_extract_response(response).await
    }
}

fn scrape_failure(err: impl std::fmt::Display) -> TrackError {
    TrackError::extraction(format!("Failed to scrape product: {}", err))
}

async fn read_extract_response(response: reqwest::Response) -> Result<ExtractResponse, TrackError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(scrape_failure(format!("provider returned {}: {}", status, body)));
    }
    response.json::<ExtractResponse>().await.map_err(scrape_failure)
}

/// Decide what an extract response means: done, still running, or failed.
fn classify_extract(resp: ExtractResponse) -> Result<Option<RawExtract>, TrackError> {
    if !resp.success {
        let reason = resp
            .error
            .unwrap_or_else(|| "Failed to extract product details from URL".to_string());
        return Err(scrape_failure(reason));
    }
    match resp.status.as_deref() {
        Some("failed") | Some("cancelled") => Err(scrape_failure(
            resp.error
                .unwrap_or_else(|| "extraction job did not complete".to_string()),
        )),
        Some("completed") => Ok(Some(resp.data.unwrap_or_default())),
        _ => match resp.data {
            Some(data) if data.has_content() => Ok(Some(data)),
            _ => Ok(None),
        },
    }
}

#[async_trait]
impl ProductFetcher for FirecrawlFetcher {
    async fn fetch(&self, url: &str) -> Result<ScrapeResult, TrackError> {
        let first = self.start_extract(url).await?;
        let job_id = first.id.clone();
        if let Some(data) = classify_extract(first)? {
            return data.into_scrape_result();
        }
        let job_id = job_id.ok_or_else(|| {
            scrape_failure("provider returned neither data nor an extraction job id")
        })?;
        debug!(job_id = %job_id, url, "waiting for firecrawl extraction");

        for _ in 0..MAX_EXTRACT_POLLS {
            tokio::time::sleep(self.poll_interval).await;
            if let Some(data) = classify_extract(self.poll_extract(&job_id).await?)? {
                return data.into_scrape_result();
            }
        }
        warn!(job_id = %job_id, url, "firecrawl extraction never completed");
        Err(scrape_failure("extraction job did not complete in time"))
    }
}

// ── HTML meta tags ──────────────────────────────────────────────

pub struct MetaTagFetcher {
    client: reqwest::Client,
}

impl MetaTagFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        MetaTagFetcher { client }
    }
}

#[async_trait]
impl ProductFetcher for MetaTagFetcher {
    async fn fetch(&self, url: &str) -> Result<ScrapeResult, TrackError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(scrape_failure)?;
        let html = response.text().await.map_err(scrape_failure)?;
        parse_product_html(&html, url)
    }
}

fn first_attr(document: &scraper::Html, selector: &str, attr: &str) -> Option<String> {
    let sel = scraper::Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn first_text(document: &scraper::Html, selector: &str) -> Option<String> {
    let sel = scraper::Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|v| !v.is_empty())
}

/// Parse a product page's OpenGraph / schema.org markup.
pub fn parse_product_html(html: &str, page_url: &str) -> Result<ScrapeResult, TrackError> {
    let document = scraper::Html::parse_document(html);

    let product_name = first_attr(&document, r#"meta[property="og:title"]"#, "content")
        .or_else(|| first_attr(&document, r#"meta[name="twitter:title"]"#, "content"))
        .or_else(|| first_text(&document, r#"[itemprop="name"]"#))
        .or_else(|| first_text(&document, "title"))
        .ok_or_else(|| TrackError::extraction("No data extracted from URL"))?;

    let current_price = [
        r#"meta[property="product:price:amount"]"#,
        r#"meta[property="og:price:amount"]"#,
        r#"meta[itemprop="price"]"#,
    ]
    .iter()
    .find_map(|sel| first_attr(&document, sel, "content"))
    .or_else(|| first_text(&document, r#"[itemprop="price"]"#))
    .and_then(|raw| parse_price_text(&raw));

    let currency_code = [
        r#"meta[property="product:price:currency"]"#,
        r#"meta[property="og:price:currency"]"#,
        r#"meta[itemprop="priceCurrency"]"#,
    ]
    .iter()
    .find_map(|sel| first_attr(&document, sel, "content"));

    let product_image_url = first_attr(&document, r#"meta[property="og:image"]"#, "content")
        .map(|src| resolve_url(page_url, &src));

    Ok(ScrapeResult {
        product_name,
        current_price,
        currency_code,
        product_image_url,
    })
}

fn resolve_url(page_url: &str, src: &str) -> String {
    url::Url::parse(page_url)
        .and_then(|base| base.join(src))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| src.to_string())
}
