//! Configuration management for the auto trade system.
//!
//! Loads settings from environment variables and config files.

use crate::strategy::StrategyRequest;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Price source and ticker universe
    #[serde(default)]
    pub pricing: PricingConfig,
    /// Strategy evaluation loop
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    /// Broker connection for trade action messages
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Strategies registered at startup once prices are warm
    #[serde(default)]
    pub strategies: Vec<StrategyRequest>,
}

/// Which kind of price source feeds the price map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceKind {
    /// Fetch the full price map on a fixed interval
    #[default]
    Polling,
    /// Merge incremental trade updates from a push subscription
    Streaming,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub source: PriceSourceKind,
    /// Base URL of the quote REST API
    #[serde(default = "default_quote_url")]
    pub quote_url: String,
    /// WebSocket URL of the trade stream
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    /// API token for both endpoints
    #[serde(default)]
    pub api_token: String,
    /// Known ticker universe, in canonical casing
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,
    /// Seconds between full price fetches (polling only)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds to wait before reconnecting after a failure
    #[serde(default = "default_pricing_recovery")]
    pub recovery_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Milliseconds between evaluation ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker management endpoint
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Virtual host holding the exchange
    #[serde(default = "default_vhost")]
    pub vhost: String,
    /// Exchange trade actions are published to
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    /// Seconds to wait before retrying a failed publish
    #[serde(default = "default_broker_recovery")]
    pub recovery_interval_secs: u64,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Bounds on the evaluation tick, in milliseconds.
const MIN_TICK_INTERVAL_MS: u64 = 500;
const MAX_TICK_INTERVAL_MS: u64 = 30_000;

// Default value functions
fn default_quote_url() -> String {
    "https://finnhub.io/api/v1".to_string()
}

fn default_stream_url() -> String {
    "wss://ws.finnhub.io".to_string()
}

fn default_tickers() -> Vec<String> {
    vec!["IBM".to_string(), "AMZN".to_string(), "AAPL".to_string()]
}

fn default_poll_interval() -> u64 {
    60
}

fn default_pricing_recovery() -> u64 {
    5
}

fn default_tick_interval() -> u64 {
    5000
}

fn default_broker_url() -> String {
    "http://localhost:15672".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_exchange() -> String {
    "trade-actions".to_string()
}

fn default_credential() -> String {
    "guest".to_string()
}

fn default_broker_recovery() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("AUTOTRADE")
                    .list_separator(",")
                    .with_list_parse_key("pricing.tickers")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.pricing.tickers.is_empty(),
            "pricing.tickers must contain at least one ticker"
        );

        let mut seen = HashSet::new();
        for ticker in &self.pricing.tickers {
            let len = ticker.chars().count();
            anyhow::ensure!(
                (3..=5).contains(&len),
                "ticker '{}' must be between 3 and 5 characters",
                ticker
            );
            anyhow::ensure!(
                seen.insert(ticker.to_uppercase()),
                "ticker '{}' is listed more than once",
                ticker
            );
        }

        anyhow::ensure!(
            self.pricing.poll_interval_secs > 0 && self.pricing.recovery_interval_secs > 0,
            "pricing intervals must be greater than 0"
        );

        anyhow::ensure!(
            (MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&self.evaluator.tick_interval_ms),
            "evaluator.tick_interval_ms must be between {} and {}",
            MIN_TICK_INTERVAL_MS,
            MAX_TICK_INTERVAL_MS
        );

        anyhow::ensure!(
            !self.broker.exchange.trim().is_empty(),
            "broker.exchange must not be empty"
        );

        anyhow::ensure!(
            self.broker.recovery_interval_secs > 0 && self.broker.request_timeout_secs > 0,
            "broker intervals must be greater than 0"
        );

        Ok(())
    }
}

impl PricingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }
}

impl EvaluatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl BrokerConfig {
    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            source: PriceSourceKind::default(),
            quote_url: default_quote_url(),
            stream_url: default_stream_url(),
            api_token: String::new(),
            tickers: default_tickers(),
            poll_interval_secs: default_poll_interval(),
            recovery_interval_secs: default_pricing_recovery(),
        }
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            vhost: default_vhost(),
            exchange: default_exchange(),
            username: default_credential(),
            password: default_credential(),
            recovery_interval_secs: default_broker_recovery(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}
