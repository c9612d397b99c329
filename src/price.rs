use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::models::PriceQuote;

pub const DEFAULT_PRICE_URLS: [&str; 2] = [
    "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@latest/v1/currencies/eth.json",
    "https://latest.currency-api.pages.dev/v1/currencies/eth.json",
];

#[derive(Debug, Deserialize)]
struct CurrencyResponse {
    eth: HashMap<String, f64>,
}

/// Looks up the ETH -> fiat rate, trying each configured URL in order.
#[derive(Clone)]
pub struct PriceClient {
    client: reqwest::Client,
    urls: Vec<String>,
    fiat: String,
}

impl PriceClient {
    pub fn new(urls: Vec<String>, fiat: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            urls,
            fiat: fiat.to_lowercase(),
        })
    }

    /// Returns `None` when every source fails; callers then report base-asset
    /// amounts only.
    pub async fn fetch_quote(&self) -> Option<PriceQuote> {
        for url in &self.urls {
            match self.fetch_rate(url).await {
                Ok(rate) => {
                    info!("ETH/{} rate {} from {}", self.fiat, rate, url);
                    return Some(PriceQuote {
                        fiat: self.fiat.clone(),
                        rate,
                    });
                }
                Err(err) => warn!("price source {} failed: {:#}", url, err),
            }
        }
        warn!("all price sources failed; fiat values unavailable");
        None
    }

    async fn fetch_rate(&self, url: &str) -> Result<f64> {
        let body: CurrencyResponse = self
            .client
            .get(url)
            .send()
            .await
            .context("price request failed")?
            .error_for_status()?
            .json()
            .await
            .context("malformed price response")?;

        let rate = body
            .eth
            .get(&self.fiat)
            .copied()
            .ok_or_else(|| anyhow!("no {} rate in response", self.fiat))?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(anyhow!("implausible rate {}", rate));
        }
        Ok(rate)
    }
}

/// Converts a base-asset amount using the request's quote, if one was obtained.
pub fn convert(base_amount: f64, quote: Option<&PriceQuote>) -> Option<f64> {
    quote.map(|q| q.convert(base_amount))
}
