//! Quote REST API client (polling source).

use super::traits::QuoteSource;
use super::types::Quote;
use crate::config::PricingConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// HTTP client for the per-ticker quote endpoint.
#[derive(Debug, Clone)]
pub struct QuoteClient {
    http: Client,
    base_url: String,
    token: String,
}

impl QuoteClient {
    /// Create a new quote client from configuration.
    pub fn new(config: &PricingConfig) -> Result<Self> {
        Self::with_base_url(&config.quote_url, &config.api_token)
    }

    /// Create a new quote client with a custom base URL.
    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Get the current quote for one ticker.
    #[instrument(skip(self))]
    pub async fn get_quote(&self, ticker: &str) -> Result<Quote> {
        let url = format!(
            "{}/quote?symbol={}&token={}",
            self.base_url,
            urlencoding::encode(ticker),
            urlencoding::encode(&self.token)
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch quote")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Quote API error {} for {}: {}", status, ticker, body);
        }

        response
            .json()
            .await
            .context("Failed to parse quote response")
    }
}

#[async_trait]
impl QuoteSource for QuoteClient {
    async fn fetch_prices(&self, tickers: &[String]) -> Result<HashMap<String, Decimal>> {
        let mut prices = HashMap::with_capacity(tickers.len());

        for ticker in tickers {
            let quote = self.get_quote(ticker).await?;
            // The API answers 0 for symbols it does not know.
            if quote.current_price <= Decimal::ZERO {
                warn!(%ticker, price = %quote.current_price, "Ignoring non-positive quote");
                continue;
            }
            prices.insert(ticker.clone(), quote.current_price);
        }

        debug!("Fetched {} of {} quotes", prices.len(), tickers.len());
        Ok(prices)
    }
}
