//! # Notifier — Price-Drop Alert Delivery
//!
//! The batch runner hands a [`PriceDropAlert`] to a [`PriceAlertNotifier`] and
//! only cares whether delivery succeeded. Adapters:
//!
//! - [`ResendNotifier`]: transactional email through the Resend HTTP API.
//! - [`LogNotifier`]: writes the alert to the log and reports success. Used
//!   when no email API key is configured (local development, dry runs).
//!
//! Delivery failures are [`TrackError::Notify`] and never roll back the
//! price update that triggered them.

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::AlertSettings;
use crate::error::TrackError;

/// Facts needed to tell an owner their product got cheaper.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDropAlert {
    pub recipient: String,
    pub product_name: String,
    pub product_url: String,
    pub image_url: Option<String>,
    pub currency: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
}

impl PriceDropAlert {
    /// Percentage drop relative to the old price, rounded to one decimal.
    pub fn percent_drop(&self) -> Decimal {
        if self.old_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.old_price - self.new_price) / self.old_price * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
    }

    pub fn savings(&self) -> Decimal {
        self.old_price - self.new_price
    }
}

#[async_trait]
pub trait PriceAlertNotifier: Send + Sync {
    async fn notify(&self, alert: &PriceDropAlert) -> Result<(), TrackError>;
}

/// Pick Resend when an API key is present, otherwise log-only delivery.
pub fn build_notifier(
    settings: &AlertSettings,
    resend_api_key: Option<&str>,
) -> anyhow::Result<Arc<dyn PriceAlertNotifier>> {
    match resend_api_key {
        Some(key) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()?;
            Ok(Arc::new(ResendNotifier::new(client, settings, key)))
        }
        None => {
            info!("RESEND_API_KEY not set; price-drop alerts will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

// ── Email rendering ─────────────────────────────────────────────

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn alert_subject(alert: &PriceDropAlert) -> String {
    format!(
        "Price drop: {} is now {} {} ({}% off)",
        alert.product_name,
        alert.currency,
        alert.new_price.normalize(),
        alert.percent_drop().normalize()
    )
}

pub fn render_alert_html(alert: &PriceDropAlert, app_url: &str) -> String {
    let name = escape_html(&alert.product_name);
    let image = alert
        .image_url
        .as_deref()
        .map(|src| {
            format!(
                r#"<img src="{}" alt="{}" style="max-width:240px;border-radius:8px" />"#,
                escape_html(src),
                name
            )
        })
        .unwrap_or_default();
    format!(
        r#"<div style="font-family:sans-serif;max-width:560px">
<h2>Price drop on {name}</h2>
{image}
<p>Was <s>{cur} {old}</s>, now <strong>{cur} {new}</strong>. You save {cur} {save} ({pct}%).</p>
<p><a href="{url}">View product</a> &middot; <a href="{app}">Manage tracked products</a></p>
</div>"#,
        name = name,
        image = image,
        cur = escape_html(&alert.currency),
        old = alert.old_price.normalize(),
        new = alert.new_price.normalize(),
        save = alert.savings().normalize(),
        pct = alert.percent_drop().normalize(),
        url = escape_html(&alert.product_url),
        app = escape_html(app_url),
    )
}

// ── Resend ──────────────────────────────────────────────────────

pub struct ResendNotifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from_address: String,
    app_url: String,
}

impl ResendNotifier {
    pub fn new(client: reqwest::Client, settings: &AlertSettings, api_key: &str) -> Self {
        ResendNotifier {
            client,
            base_url: settings.resend_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from_address: settings.from_address.clone(),
            app_url: settings.app_url.clone(),
        }
    }
}

#[async_trait]
impl PriceAlertNotifier for ResendNotifier {
    async fn notify(&self, alert: &PriceDropAlert) -> Result<(), TrackError> {
        let body = serde_json::json!({
            "from": self.from_address,
            "to": [alert.recipient],
            "subject": alert_subject(alert),
            "html": render_alert_html(alert, &self.app_url),
        });
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TrackError::notify(format!("email request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TrackError::notify(format!(
                "email provider returned {}: {}",
                status, detail
            )));
        }
        Ok(())
    }
}

// ── Log-only ────────────────────────────────────────────────────

pub struct LogNotifier;

#[async_trait]
impl PriceAlertNotifier for LogNotifier {
    async fn notify(&self, alert: &PriceDropAlert) -> Result<(), TrackError> {
        info!(
            recipient = %alert.recipient,
            product = %alert.product_name,
            old_price = %alert.old_price,
            new_price = %alert.new_price,
            currency = %alert.currency,
            "price drop alert (log only)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn alert(old: &str, new: &str) -> PriceDropAlert {
        PriceDropAlert {
            recipient: "owner@example.com".into(),
            product_name: "Fan <Deluxe> & Co".into(),
            product_url: "https://shop.example/fan?id=1&ref=2".into(),
            image_url: Some("https://shop.example/fan.jpg".into()),
            currency: "BDT".into(),
            old_price: Decimal::from_str(old).unwrap(),
            new_price: Decimal::from_str(new).unwrap(),
        }
    }

    #[test]
    fn percent_drop_rounds_to_one_decimal() {
        assert_eq!(alert("100", "80").percent_drop(), Decimal::from_str("20.0").unwrap());
        assert_eq!(alert("3", "2").percent_drop(), Decimal::from_str("33.3").unwrap());
    }

    #[test]
    fn percent_drop_zero_old_price_is_zero() {
        assert_eq!(alert("0", "0").percent_drop(), Decimal::ZERO);
    }

    #[test]
    fn subject_mentions_new_price_and_percentage() {
        let subject = alert_subject(&alert("100", "80"));
        assert!(subject.contains("BDT 80"));
        assert!(subject.contains("20%"));
    }

    #[test]
    fn html_escapes_product_fields() {
        let html = render_alert_html(&alert("100.00", "79.50"), "https://deals.example");
        assert!(html.contains("Fan &lt;Deluxe&gt; &amp; Co"));
        assert!(html.contains("id=1&amp;ref=2"));
        assert!(html.contains("BDT 79.5"));
        assert!(html.contains("You save BDT 20.5"));
        assert!(!html.contains("<Deluxe>"));
    }

    #[test]
    fn html_without_image_has_no_img_tag() {
        let mut a = alert("10", "5");
        a.image_url = None;
        assert!(!render_alert_html(&a, "https://deals.example").contains("<img"));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.notify(&alert("10", "9")).await.is_ok());
    }
}
