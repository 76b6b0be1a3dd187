//! Price data types and quote/stream API payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable view of the price map at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct PriceSnapshot {
    prices: HashMap<String, Decimal>,
    taken_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Build a snapshot from `(ticker, price)` pairs.
    pub fn from_prices<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        Self {
            prices: prices.into_iter().map(|(t, p)| (t.into(), p)).collect(),
            taken_at: Utc::now(),
        }
    }

    pub fn get(&self, ticker: &str) -> Option<Decimal> {
        self.prices.get(ticker).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.prices.iter().map(|(t, p)| (t.as_str(), *p))
    }
}

/// One incremental price change from a streaming source.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub ticker: String,
    pub price: Decimal,
}

impl PriceUpdate {
    pub fn new(ticker: impl Into<String>, price: Decimal) -> Self {
        Self {
            ticker: ticker.into(),
            price,
        }
    }
}

/// Quote endpoint response. Only the current price is required.
#[derive(Debug, Clone, Deserialize)]
pub struct Quote {
    #[serde(rename = "c")]
    pub current_price: Decimal,
    #[serde(rename = "pc", default)]
    pub previous_close: Option<Decimal>,
    #[serde(rename = "t", default)]
    pub timestamp: Option<i64>,
}

/// Subscription request sent on the trade stream.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub symbol: &'a str,
}

/// Messages received on the trade stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum StreamMessage {
    Trade { data: Vec<TradeTick> },
    Ping,
    Error { msg: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TradeTick {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: Decimal,
}
