//! Source-agnostic traits for price providers.
//!
//! The feed consumes either kind of source:
//! - `QuoteSource`: pull the full ticker -> price map on demand
//! - `PriceStreamSource`: subscribe once, receive incremental updates

use super::types::PriceUpdate;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Stream of incremental updates. An `Err` item or the end of the stream
/// means the subscription is gone and must be re-established.
pub type PriceUpdateStream = BoxStream<'static, anyhow::Result<PriceUpdate>>;

/// Pull-based price source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch current prices for `tickers`. Tickers without a usable quote
    /// are omitted from the map.
    async fn fetch_prices(&self, tickers: &[String]) -> anyhow::Result<HashMap<String, Decimal>>;
}

/// Push-based price source.
#[async_trait]
pub trait PriceStreamSource: Send + Sync {
    /// Open a subscription for `tickers`.
    async fn subscribe(&self, tickers: &[String]) -> anyhow::Result<PriceUpdateStream>;
}

/// The source a `PriceFeed` runs against.
#[derive(Clone)]
pub enum PriceSource {
    Polling(Arc<dyn QuoteSource>),
    Streaming(Arc<dyn PriceStreamSource>),
}

impl PriceSource {
    pub fn kind(&self) -> &'static str {
        match self {
            PriceSource::Polling(_) => "polling",
            PriceSource::Streaming(_) => "streaming",
        }
    }
}
