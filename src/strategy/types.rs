//! Strategy records and the request shapes used to create and change them.

use crate::error::StrategyError;
use crate::utils::decimal::{decrease_by_percent, increase_by_percent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of the trade a strategy fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "Buy",
            TradeAction::Sell => "Sell",
        }
    }

    /// Trigger threshold for a strategy referenced at `original_price`.
    ///
    /// Sell waits for a rise of `price_change` percent, Buy for a drop.
    pub fn action_price(&self, original_price: Decimal, price_change: Decimal) -> Option<Decimal> {
        match self {
            TradeAction::Sell => increase_by_percent(original_price, price_change),
            TradeAction::Buy => decrease_by_percent(original_price, price_change),
        }
    }

    /// Whether `current_price` has reached `action_price`.
    pub fn is_triggered(&self, current_price: Decimal, action_price: Decimal) -> bool {
        match self {
            TradeAction::Sell => current_price >= action_price,
            TradeAction::Buy => current_price <= action_price,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = StrategyError;

    /// Accepts the names case-insensitively and the numeric codes `0`/`1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("buy") || s == "0" {
            Ok(TradeAction::Buy)
        } else if s.eq_ignore_ascii_case("sell") || s == "1" {
            Ok(TradeAction::Sell)
        } else {
            Err(StrategyError::Validation(format!(
                "trade action must be Buy or Sell, got '{}'",
                s
            )))
        }
    }
}

/// A stored price-triggered trading rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    /// Canonical ticker from the feed's universe
    pub ticker: String,
    pub trade_action: TradeAction,
    pub quantity: u64,
    /// Percent move from `original_price` that fires the strategy
    pub price_change: Decimal,
    /// Derived trigger threshold
    pub action_price: Decimal,
    /// Reference price captured when the strategy was created
    pub original_price: Decimal,
}

impl Strategy {
    pub fn is_triggered(&self, current_price: Decimal) -> bool {
        self.trade_action.is_triggered(current_price, self.action_price)
    }
}

/// Caller input for a new strategy. Fields are unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRequest {
    pub ticker: String,
    pub trade_action: String,
    pub quantity: i64,
    pub price_change: Decimal,
}

impl StrategyRequest {
    pub fn new(
        ticker: impl Into<String>,
        trade_action: impl Into<String>,
        quantity: i64,
        price_change: Decimal,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            trade_action: trade_action.into(),
            quantity,
            price_change,
        }
    }
}

/// Caller input replacing the mutable fields of an existing strategy.
///
/// The ticker is only changed (and re-validated) when supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyUpdate {
    #[serde(default)]
    pub ticker: Option<String>,
    pub trade_action: String,
    pub quantity: i64,
    pub price_change: Decimal,
}

impl StrategyUpdate {
    pub fn new(trade_action: impl Into<String>, quantity: i64, price_change: Decimal) -> Self {
        Self {
            ticker: None,
            trade_action: trade_action.into(),
            quantity,
            price_change,
        }
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }
}
