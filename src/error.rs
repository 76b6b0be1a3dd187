//! Errors surfaced synchronously to callers of the core.
//!
//! Network failures never appear here: they are absorbed (logged and retried)
//! inside the price feed and dispatcher loops.

use thiserror::Error;

/// Why a strategy add/update/remove was rejected. No side effect on rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("invalid strategy: {0}")]
    Validation(String),

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("no usable price for ticker {0}")]
    PriceUnavailable(String),

    #[error("strategy not found: {0}")]
    NotFound(String),
}

/// Price lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// Ticker is outside the universe or has not received a price yet.
    #[error("unknown ticker: {0}")]
    UnknownTicker(String),
}

impl From<PricingError> for StrategyError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::UnknownTicker(ticker) => StrategyError::UnknownTicker(ticker),
        }
    }
}

/// Trade action enqueue failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The dispatch loop has shut down; nothing enqueued now would be delivered.
    #[error("trade action dispatcher is closed")]
    Closed,
}
