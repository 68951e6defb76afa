//! `BillingService` backed by test-mode Stripe PaymentIntents.

use anyhow::{Context, Result, anyhow};
use dejima_common::ChargeStatus;
use reqwest::Client;
use serde::Deserialize;

use crate::application::ports::{BillingReceipt, BillingService};

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
}

/// Whole cents, rounded half away from zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_cents(amount_usd: f64) -> i64 {
    (amount_usd * 100.0).round() as i64
}

pub struct StripeBilling {
    http: Client,
    base: String,
    secret_key: Option<String>,
}

impl StripeBilling {
    /// A `None` key makes every charge fail, which the pipeline records as skipped.
    #[must_use]
    pub fn new(secret_key: Option<String>) -> Self {
        Self::with_base(STRIPE_API_BASE, secret_key)
    }

    #[must_use]
    pub fn with_base(base: impl Into<String>, secret_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            secret_key,
        }
    }
}

impl BillingService for StripeBilling {
    async fn charge(&self, amount_usd: f64, description: &str) -> Result<BillingReceipt> {
        let key = self
            .secret_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("billing secret key not set (DEJIMA_STRIPE_SECRET_KEY)"))?;

        let url = format!("{}/v1/payment_intents", self.base);
        let cents = to_cents(amount_usd).to_string();
        let form = [
            ("amount", cents.as_str()),
            ("currency", "usd"),
            ("description", description),
            ("metadata[managed_by]", "dejima"),
            ("metadata[demo]", "true"),
        ];
        let response = self
            .http
            .post(&url)
            .bearer_auth(key)
            .form(&form)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("payment intent rejected ({status}): {body}"));
        }
        let intent: PaymentIntent = response.json().await.context("parsing payment intent")?;
        tracing::info!(intent = %intent.id, status = %intent.status, "payment intent created");
        Ok(BillingReceipt {
            reference: intent.id,
            status: ChargeStatus::from_provider(&intent.status),
        })
    }
}
