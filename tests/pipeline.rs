//! End-to-end: price feed -> strategy store -> evaluator -> dispatcher -> broker.

use anyhow::anyhow;
use async_trait::async_trait;
use autotrade::dispatch::{ActionDispatcher, BrokerChannel, BrokerConnector, OutboundMessage, TradeActionSink};
use autotrade::pricing::{PriceFeed, PriceSource, QuoteSource};
use autotrade::runtime::Shutdown;
use autotrade::strategy::{StrategyEvaluator, StrategyRequest, StrategyStore, TradeAction};
use autotrade::DispatchError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const FAST: Duration = Duration::from_millis(10);

/// Quote source serving whatever prices the test sets.
#[derive(Default)]
struct ScriptedQuotes {
    prices: Mutex<HashMap<String, Decimal>>,
}

impl ScriptedQuotes {
    fn set(&self, ticker: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(ticker.to_string(), price);
    }
}

#[async_trait]
impl QuoteSource for ScriptedQuotes {
    async fn fetch_prices(&self, tickers: &[String]) -> anyhow::Result<HashMap<String, Decimal>> {
        let prices = self.prices.lock().unwrap();
        Ok(tickers
            .iter()
            .filter_map(|t| prices.get(t).map(|p| (t.clone(), *p)))
            .collect())
    }
}

/// Broker that refuses the first `failures` connections, then records bodies.
struct RecordingBroker {
    failures: u32,
    attempts: AtomicU32,
    published: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingBroker {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn messages(&self) -> Vec<OutboundMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|body| serde_json::from_slice(body).unwrap())
            .collect()
    }
}

struct RecordingChannel {
    published: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl BrokerConnector for RecordingBroker {
    async fn connect(&self) -> anyhow::Result<Box<dyn BrokerChannel>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(anyhow!("connection refused"));
        }
        Ok(Box::new(RecordingChannel {
            published: self.published.clone(),
        }))
    }
}

#[async_trait]
impl BrokerChannel for RecordingChannel {
    async fn publish(&self, _exchange: &str, _routing_key: &str, body: &[u8], mandatory: bool) -> anyhow::Result<()> {
        assert!(mandatory);
        self.published.lock().unwrap().push(body.to_vec());
        Ok(())
    }
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_triggered_strategy_is_published_and_removed() {
    let quotes = Arc::new(ScriptedQuotes::default());
    quotes.set("TEST", dec!(100));
    quotes.set("IBM", dec!(180));

    let feed = Arc::new(
        PriceFeed::new(["TEST", "IBM"])
            .with_poll_interval(FAST)
            .with_recovery_interval(FAST),
    );
    let store = Arc::new(StrategyStore::new(feed.clone()));
    let broker = Arc::new(RecordingBroker::new(1));
    let dispatcher = Arc::new(ActionDispatcher::new(broker.clone(), "trade-actions", FAST));
    let evaluator = Arc::new(StrategyEvaluator::new(
        store.clone(),
        feed.clone(),
        dispatcher.clone(),
        FAST,
    ));

    let shutdown = Shutdown::new();
    let tasks = vec![
        {
            let (feed, shutdown, quotes) = (feed.clone(), shutdown.clone(), quotes.clone());
            tokio::spawn(async move { feed.run(PriceSource::Polling(quotes), &shutdown).await })
        },
        {
            let (evaluator, shutdown) = (evaluator.clone(), shutdown.clone());
            tokio::spawn(async move { evaluator.run(&shutdown).await })
        },
        {
            let (dispatcher, shutdown) = (dispatcher.clone(), shutdown.clone());
            tokio::spawn(async move { dispatcher.run(&shutdown).await })
        },
    ];

    tokio::time::timeout(Duration::from_secs(3), feed.wait_until_warm(&shutdown))
        .await
        .expect("feed never warmed up")
        .unwrap();

    let buy = store
        .add_strategy(&StrategyRequest::new("test", "Buy", 5, dec!(10)))
        .unwrap();
    let sell = store
        .add_strategy(&StrategyRequest::new("IBM", "Sell", 2, dec!(10)))
        .unwrap();
    assert_eq!(buy.action_price, dec!(90));
    assert_eq!(sell.action_price, dec!(198));

    quotes.set("TEST", dec!(85));
    wait_for("buy strategy to fire", || store.get_strategy(&buy.id).is_none()).await;
    wait_for("message to be published", || !broker.messages().is_empty()).await;

    let messages = broker.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].ticker, "TEST");
    assert_eq!(messages[0].quantity, 5);
    assert_eq!(messages[0].action, "Buy");

    // One refused connection, then success.
    assert_eq!(broker.attempts.load(Ordering::SeqCst), 2);
    assert!(store.get_strategy(&sell.id).is_some());

    shutdown.trigger();
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop did not stop on shutdown")
            .unwrap();
    }
}

#[tokio::test]
async fn test_closed_dispatcher_keeps_triggered_strategy() {
    let feed = Arc::new(PriceFeed::new(["TEST"]));
    feed.apply_update("TEST", dec!(100));

    let store = Arc::new(StrategyStore::new(feed.clone()));
    let strategy = store
        .add_strategy(&StrategyRequest::new("TEST", "Sell", 1, dec!(5)))
        .unwrap();

    let broker = Arc::new(RecordingBroker::new(0));
    let dispatcher = Arc::new(ActionDispatcher::new(broker.clone(), "trade-actions", FAST));

    let shutdown = Shutdown::new();
    shutdown.trigger();
    dispatcher.run(&shutdown).await;
    assert_eq!(
        dispatcher.enqueue("TEST", 1, TradeAction::Sell),
        Err(DispatchError::Closed)
    );

    let evaluator = StrategyEvaluator::new(store.clone(), feed.clone(), dispatcher, FAST);
    feed.apply_update("TEST", dec!(110));

    let report = evaluator.tick();
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.triggered, 0);
    assert_eq!(store.get_strategy(&strategy.id), Some(strategy));
    assert!(broker.messages().is_empty());
}
