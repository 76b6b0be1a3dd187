//! # AutoTrade
//!
//! Price-triggered trading strategies with reliable trade-action dispatch.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `runtime`: Shutdown signal, fixed-backoff retry and periodic task runner
//! - `pricing`: Ticker price feed (REST polling or WebSocket streaming)
//! - `strategy`: Strategy store and the periodic evaluator
//! - `dispatch`: Trade action queue and broker publishing
//! - `error`: Errors returned synchronously to callers
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod dispatch;
pub mod error;
pub mod pricing;
pub mod runtime;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::{DispatchError, PricingError, StrategyError};
