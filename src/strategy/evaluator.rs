//! Periodic strategy evaluation against the latest prices.

use super::store::StrategyStore;
use crate::dispatch::TradeActionSink;
use crate::pricing::PriceFeed;
use crate::runtime::{run_periodic, Shutdown};
use crate::utils::decimal::percentage_diff;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Outcome of a single evaluation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Strategies that had a price in the snapshot
    pub evaluated: usize,
    /// Strategies whose trade action was handed to the dispatcher
    pub triggered: usize,
    /// Triggered strategies actually removed from the store
    pub removed: usize,
    /// The snapshot was empty and nothing was evaluated
    pub skipped: bool,
}

/// Fires strategies whose trigger price has been reached.
pub struct StrategyEvaluator {
    store: Arc<StrategyStore>,
    feed: Arc<PriceFeed>,
    sink: Arc<dyn TradeActionSink>,
    interval: Duration,
}

impl StrategyEvaluator {
    pub fn new(
        store: Arc<StrategyStore>,
        feed: Arc<PriceFeed>,
        sink: Arc<dyn TradeActionSink>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            feed,
            sink,
            interval,
        }
    }

    /// Evaluate every strategy against one price snapshot.
    ///
    /// A strategy is removed only after its trade action was accepted by the
    /// dispatcher. Strategies added while the tick runs wait for the next one.
    pub fn tick(&self) -> TickReport {
        let prices = self.feed.get_latest_prices();
        if prices.is_empty() {
            debug!("No prices available, skipping evaluation");
            return TickReport {
                skipped: true,
                ..TickReport::default()
            };
        }

        let mut report = TickReport::default();
        let mut fired = Vec::new();

        for (id, strategy) in self.store.get_strategies() {
            let Some(price) = prices.get(&strategy.ticker) else {
                trace!(%id, ticker = %strategy.ticker, "No price for ticker yet");
                continue;
            };
            report.evaluated += 1;

            if !strategy.is_triggered(price) {
                trace!(
                    %id,
                    ticker = %strategy.ticker,
                    %price,
                    action_price = %strategy.action_price,
                    distance_pct = ?percentage_diff(price, strategy.action_price).map(|d| d.round_dp(2)),
                    "Strategy not triggered"
                );
                continue;
            }

            info!(
                %id,
                ticker = %strategy.ticker,
                action = %strategy.trade_action,
                quantity = strategy.quantity,
                %price,
                action_price = %strategy.action_price,
                "Strategy triggered"
            );

            match self
                .sink
                .enqueue(&strategy.ticker, strategy.quantity, strategy.trade_action)
            {
                Ok(message_id) => {
                    debug!(%id, %message_id, "Trade action queued");
                    report.triggered += 1;
                    fired.push(id);
                }
                Err(e) => {
                    error!(%id, ticker = %strategy.ticker, error = %e, "Failed to queue trade action, keeping strategy");
                }
            }
        }

        report.removed = self.store.remove_triggered(&fired);

        if report.triggered > 0 {
            info!(
                evaluated = report.evaluated,
                triggered = report.triggered,
                removed = report.removed,
                "Evaluation tick complete"
            );
        }

        report
    }

    /// Wait for the first prices, then evaluate every interval until shutdown.
    pub async fn run(&self, shutdown: &Shutdown) {
        info!("Strategy evaluator waiting for initial prices");
        if self.feed.wait_until_warm(shutdown).await.is_err() {
            info!("Strategy evaluator cancelled before first tick");
            return;
        }

        run_periodic("strategy evaluator", self.interval, shutdown, move || async move {
            self.tick();
        })
        .await;
    }
}
