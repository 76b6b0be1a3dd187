//! Live ticker -> price map kept warm by a background update loop.

use super::traits::{PriceSource, PriceStreamSource, QuoteSource};
use super::types::PriceSnapshot;
use crate::config::PricingConfig;
use crate::error::PricingError;
use crate::runtime::{retry_with_backoff, run_periodic, Cancelled, Shutdown};
use dashmap::DashMap;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Near-real-time price map for a fixed ticker universe.
///
/// Each ticker's price is replaced atomically; snapshots are consistent per
/// ticker and eventually consistent across tickers.
pub struct PriceFeed {
    /// Canonical ticker universe
    tickers: Vec<String>,
    prices: DashMap<String, Decimal>,
    /// Flips to `true` once, on the first stored price
    warm: watch::Sender<bool>,
    poll_interval: Duration,
    recovery_interval: Duration,
}

impl PriceFeed {
    const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
    const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(5);

    /// Create an empty feed for the given canonical tickers.
    pub fn new<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (warm, _) = watch::channel(false);
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
            prices: DashMap::new(),
            warm,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            recovery_interval: Self::DEFAULT_RECOVERY_INTERVAL,
        }
    }

    pub fn from_config(config: &PricingConfig) -> Self {
        Self::new(config.tickers.iter().cloned())
            .with_poll_interval(config.poll_interval())
            .with_recovery_interval(config.recovery_interval())
    }

    /// Set the period between full fetches for polling sources.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the wait before reconnecting after a failure.
    pub fn with_recovery_interval(mut self, interval: Duration) -> Self {
        self.recovery_interval = interval;
        self
    }

    /// Current prices. Never blocks on the update loop; may be empty.
    pub fn get_latest_prices(&self) -> PriceSnapshot {
        PriceSnapshot::from_prices(self.prices.iter().map(|e| (e.key().clone(), *e.value())))
    }

    /// Current price of one ticker (matched case-insensitively).
    pub fn get_latest_price(&self, ticker: &str) -> Result<Decimal, PricingError> {
        let canonical = self
            .canonical_ticker(ticker)
            .ok_or_else(|| PricingError::UnknownTicker(ticker.to_string()))?;

        self.prices
            .get(canonical)
            .map(|price| *price)
            .ok_or_else(|| PricingError::UnknownTicker(ticker.to_string()))
    }

    /// The canonical ticker universe.
    pub fn get_latest_tickers(&self) -> HashSet<String> {
        self.tickers.iter().cloned().collect()
    }

    /// Resolve `ticker` to its canonical casing, if it is in the universe.
    pub fn canonical_ticker(&self, ticker: &str) -> Option<&str> {
        self.tickers
            .iter()
            .find(|known| known.eq_ignore_ascii_case(ticker))
            .map(String::as_str)
    }

    /// Whether at least one price has been loaded.
    pub fn is_warm(&self) -> bool {
        *self.warm.borrow()
    }

    /// Wait for the first non-empty price set, or for shutdown.
    pub async fn wait_until_warm(&self, shutdown: &Shutdown) -> Result<(), Cancelled> {
        let mut rx = self.warm.subscribe();
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(Cancelled),
            _ = rx.wait_for(|warm| *warm) => Ok(()),
        }
    }

    /// Merge one price. Unknown tickers and non-positive prices are ignored.
    ///
    /// Returns whether the price was stored.
    pub fn apply_update(&self, ticker: &str, price: Decimal) -> bool {
        if price <= Decimal::ZERO {
            trace!(%ticker, %price, "Ignoring non-positive price");
            return false;
        }

        let Some(canonical) = self.canonical_ticker(ticker) else {
            trace!(%ticker, "Ignoring price for ticker outside the universe");
            return false;
        };

        self.prices.insert(canonical.to_string(), price);
        self.mark_warm();
        true
    }

    /// Merge a full price map. Returns the number of prices stored.
    pub fn apply_prices(&self, prices: HashMap<String, Decimal>) -> usize {
        prices
            .into_iter()
            .filter(|(ticker, price)| self.apply_update(ticker, *price))
            .count()
    }

    fn mark_warm(&self) {
        self.warm.send_if_modified(|warm| {
            if *warm {
                false
            } else {
                info!("Initial prices loaded");
                *warm = true;
                true
            }
        });
    }

    /// Keep the price map updated from `source` until `shutdown` fires.
    ///
    /// Transient failures are logged and retried after the recovery interval,
    /// indefinitely.
    pub async fn run(&self, source: PriceSource, shutdown: &Shutdown) {
        info!(source = source.kind(), tickers = ?self.tickers, "Price feed is starting");

        match source {
            PriceSource::Polling(source) => self.run_polling(source.as_ref(), shutdown).await,
            PriceSource::Streaming(source) => self.run_streaming(source.as_ref(), shutdown).await,
        }

        info!("Price feed is stopping");
    }

    async fn run_polling(&self, source: &dyn QuoteSource, shutdown: &Shutdown) {
        run_periodic("price poller", self.poll_interval, shutdown, move || async move {
            let polled =
                retry_with_backoff("price poll", self.recovery_interval, shutdown, || self.poll_once(source))
                    .await;

            if let Ok(polled) = polled {
                debug!(stored = polled.value, retries = polled.retries, "Prices refreshed");
            }
        })
        .await;
    }

    async fn poll_once(&self, source: &dyn QuoteSource) -> anyhow::Result<usize> {
        let prices = source.fetch_prices(&self.tickers).await?;
        Ok(self.apply_prices(prices))
    }

    async fn run_streaming(&self, source: &dyn PriceStreamSource, shutdown: &Shutdown) {
        // Each healthy session restarts the attempt count.
        loop {
            let session = retry_with_backoff("price stream", self.recovery_interval, shutdown, || {
                self.consume_stream(source)
            })
            .await;

            if session.is_err() || !shutdown.sleep(self.recovery_interval).await {
                break;
            }
        }
    }

    /// Apply updates until the subscription is lost.
    ///
    /// Returns the number of updates received if any arrived; a session that
    /// delivered nothing is an error.
    async fn consume_stream(&self, source: &dyn PriceStreamSource) -> anyhow::Result<usize> {
        let mut updates = source.subscribe(&self.tickers).await?;
        let mut delivered = 0usize;

        let reason = loop {
            match updates.next().await {
                Some(Ok(update)) => {
                    self.apply_update(&update.ticker, update.price);
                    delivered += 1;
                }
                Some(Err(e)) => break e,
                None => break anyhow::anyhow!("price stream ended"),
            }
        };

        if delivered == 0 {
            return Err(reason);
        }

        warn!(
            delivered,
            error = %format!("{reason:#}"),
            retry_in_secs = self.recovery_interval.as_secs_f64(),
            "Price stream lost, reconnecting"
        );
        Ok(delivered)
    }
}
