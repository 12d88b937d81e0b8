//! Display-only currency conversion.
//!
//! Rates come from an exchange-rate HTTP API and are cached per base
//! currency for one hour using `moka`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{IntegrationError, RateSource, error_from_response};

const SERVICE: &str = "currency";
const RATE_TTL: Duration = Duration::from_secs(60 * 60);

/// Client for `open.er-api.com`-style endpoints: `GET {base_url}/{BASE}`.
#[derive(Clone)]
pub struct HttpRateSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct RatesResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

impl HttpRateSource {
    /// # Errors
    ///
    /// Returns `IntegrationError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    #[instrument(skip(self))]
    async fn latest(&self, base: &str) -> Result<HashMap<String, Decimal>, IntegrationError> {
        let response = self.client.get(format!("{}/{base}", self.base_url)).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(SERVICE, response).await);
        }
        let body: RatesResponse = response.json().await?;
        if body.result.as_deref().is_some_and(|r| r != "success") || body.rates.is_empty() {
            return Err(IntegrationError::Decode { service: SERVICE, message: format!("no rates for {base}") });
        }
        Ok(body.rates.into_iter().map(|(k, v)| (k.to_uppercase(), v)).collect())
    }
}

/// Result of a conversion, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Conversion {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub rate: Decimal,
    pub converted: Decimal,
}

/// Converts amounts using cached rates.
#[derive(Clone)]
pub struct CurrencyConverter {
    source: Arc<dyn RateSource>,
    cache: Cache<String, Arc<HashMap<String, Decimal>>>,
}

impl CurrencyConverter {
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        let cache = Cache::builder().max_capacity(64).time_to_live(RATE_TTL).build();
        Self { source, cache }
    }

    async fn rates(&self, base: &str) -> Result<Arc<HashMap<String, Decimal>>, IntegrationError> {
        if let Some(rates) = self.cache.get(base).await {
            debug!(base, "Rate cache hit");
            return Ok(rates);
        }
        let rates = Arc::new(self.source.latest(base).await?);
        self.cache.insert(base.to_string(), Arc::clone(&rates)).await;
        Ok(rates)
    }

    /// Converts `amount` from one currency to another, rounded to two places.
    ///
    /// # Errors
    ///
    /// Returns `IntegrationError::Rejected` for a negative amount, a malformed
    /// or unknown currency code, or a result too large to represent, and the
    /// rate source's error when rates cannot be fetched.
    pub async fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Conversion, IntegrationError> {
        if amount.is_sign_negative() {
            return Err(IntegrationError::Rejected("Amount cannot be negative".into()));
        }
        let (from, to) = (currency_code(from)?, currency_code(to)?);
        let rate = if from == to {
            Decimal::ONE
        } else {
            let rates = self.rates(&from).await?;
            *rates
                .get(&to)
                .ok_or_else(|| IntegrationError::Rejected(format!("Unsupported currency: {to}")))?
        };
        let converted = amount
            .checked_mul(rate)
            .ok_or_else(|| IntegrationError::Rejected("Amount is too large to convert".into()))?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Ok(Conversion { from, to, amount, rate, converted })
    }
}

/// ISO 4217 style code: three ASCII letters, upper-cased.
fn currency_code(code: &str) -> Result<String, IntegrationError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(IntegrationError::Rejected(format!("Invalid currency code: {code}")));
    }
    Ok(code.to_ascii_uppercase())
}
