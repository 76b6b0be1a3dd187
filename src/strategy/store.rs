//! Concurrent strategy registry.

use super::types::{Strategy, StrategyRequest, StrategyUpdate, TradeAction};
use crate::error::StrategyError;
use crate::pricing::PriceFeed;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Validated strategy fields, before a price is attached.
struct ValidatedFields {
    ticker: String,
    trade_action: TradeAction,
    quantity: u64,
    price_change: Decimal,
}

/// Keyed store of active strategies.
///
/// Every operation is atomic per strategy; callers on any thread may add,
/// update or remove while the evaluator iterates a snapshot.
pub struct StrategyStore {
    strategies: DashMap<String, Strategy>,
    feed: Arc<PriceFeed>,
}

impl StrategyStore {
    pub fn new(feed: Arc<PriceFeed>) -> Self {
        Self {
            strategies: DashMap::new(),
            feed,
        }
    }

    /// Validate `request`, capture the current price and store a new strategy.
    ///
    /// Every successful call creates an independent record with a fresh ID.
    pub fn add_strategy(&self, request: &StrategyRequest) -> Result<Strategy, StrategyError> {
        let result = self.build_strategy(request);

        match &result {
            Ok(strategy) => {
                self.strategies.insert(strategy.id.clone(), strategy.clone());
                info!(
                    id = %strategy.id,
                    ticker = %strategy.ticker,
                    action = %strategy.trade_action,
                    quantity = strategy.quantity,
                    original_price = %strategy.original_price,
                    action_price = %strategy.action_price,
                    "Strategy added"
                );
            }
            Err(e) => warn!(ticker = %request.ticker, error = %e, "Rejected new strategy"),
        }

        result
    }

    fn build_strategy(&self, request: &StrategyRequest) -> Result<Strategy, StrategyError> {
        let fields = self.validate(
            &request.ticker,
            &request.trade_action,
            request.quantity,
            request.price_change,
        )?;

        let original_price = self
            .feed
            .get_latest_price(&fields.ticker)
            .ok()
            .filter(|price| *price > Decimal::ZERO)
            .ok_or_else(|| StrategyError::PriceUnavailable(fields.ticker.clone()))?;

        let action_price = compute_action_price(&fields, original_price)?;

        Ok(Strategy {
            id: Uuid::new_v4().to_string(),
            ticker: fields.ticker,
            trade_action: fields.trade_action,
            quantity: fields.quantity,
            price_change: fields.price_change,
            action_price,
            original_price,
        })
    }

    /// Replace the mutable fields of strategy `id`.
    ///
    /// The original price is kept and only the action price is recomputed. On
    /// any error the stored record is left untouched.
    pub fn update_strategy(&self, id: &str, update: &StrategyUpdate) -> Result<Strategy, StrategyError> {
        let result = self.apply_update(id, update);

        match &result {
            Ok(strategy) => info!(
                id = %strategy.id,
                ticker = %strategy.ticker,
                action = %strategy.trade_action,
                quantity = strategy.quantity,
                action_price = %strategy.action_price,
                "Strategy updated"
            ),
            Err(e) => warn!(%id, error = %e, "Rejected strategy update"),
        }

        result
    }

    fn apply_update(&self, id: &str, update: &StrategyUpdate) -> Result<Strategy, StrategyError> {
        let mut existing = self
            .strategies
            .get_mut(id)
            .ok_or_else(|| StrategyError::NotFound(id.to_string()))?;

        let ticker = update.ticker.as_deref().unwrap_or(&existing.ticker);
        let fields = self.validate(ticker, &update.trade_action, update.quantity, update.price_change)?;
        let action_price = compute_action_price(&fields, existing.original_price)?;

        let strategy = existing.value_mut();
        strategy.ticker = fields.ticker;
        strategy.trade_action = fields.trade_action;
        strategy.quantity = fields.quantity;
        strategy.price_change = fields.price_change;
        strategy.action_price = action_price;

        Ok(strategy.clone())
    }

    /// Remove strategy `id`, returning the removed record.
    pub fn remove_strategy(&self, id: &str) -> Result<Strategy, StrategyError> {
        match self.strategies.remove(id) {
            Some((_, strategy)) => {
                info!(%id, ticker = %strategy.ticker, "Strategy removed");
                Ok(strategy)
            }
            None => Err(StrategyError::NotFound(id.to_string())),
        }
    }

    /// Point-in-time copy of every strategy, keyed by ID.
    pub fn get_strategies(&self) -> HashMap<String, Strategy> {
        self.strategies
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get_strategy(&self, id: &str) -> Option<Strategy> {
        self.strategies.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Drop every listed ID. Returns how many were present.
    pub(crate) fn remove_triggered(&self, ids: &[String]) -> usize {
        ids.iter()
            .filter(|id| self.strategies.remove(id.as_str()).is_some())
            .count()
    }

    /// Checks run in a fixed order; the first failure wins.
    fn validate(
        &self,
        ticker: &str,
        trade_action: &str,
        quantity: i64,
        price_change: Decimal,
    ) -> Result<ValidatedFields, StrategyError> {
        let ticker = ticker.trim();
        let len = ticker.chars().count();
        if !(3..=5).contains(&len) {
            return Err(StrategyError::Validation(format!(
                "ticker must be 3 to 5 characters, got '{}'",
                ticker
            )));
        }

        let trade_action: TradeAction = trade_action.parse()?;

        let quantity = u64::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| StrategyError::Validation(format!("quantity must be positive, got {}", quantity)))?;

        if price_change <= Decimal::ZERO {
            return Err(StrategyError::Validation(format!(
                "price change must be positive, got {}",
                price_change
            )));
        }

        let ticker = self
            .feed
            .canonical_ticker(ticker)
            .ok_or_else(|| StrategyError::UnknownTicker(ticker.to_string()))?
            .to_string();

        Ok(ValidatedFields {
            ticker,
            trade_action,
            quantity,
            price_change,
        })
    }
}

fn compute_action_price(fields: &ValidatedFields, original_price: Decimal) -> Result<Decimal, StrategyError> {
    fields
        .trade_action
        .action_price(original_price, fields.price_change)
        .ok_or_else(|| StrategyError::Validation(format!("price change {} is out of range", fields.price_change)))
}
