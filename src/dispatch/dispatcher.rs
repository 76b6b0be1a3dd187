//! Queue of trade actions, published to the broker with retry.

use super::traits::{BrokerChannel, BrokerConnector, TradeActionSink};
use super::types::{DrainReport, OutboundMessage};
use crate::error::DispatchError;
use crate::runtime::{retry_with_backoff, Cancelled, Shutdown};
use crate::strategy::TradeAction;
use anyhow::Context;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Routing key for every trade action; the exchange decides delivery.
const ROUTING_KEY: &str = "";

/// Decouples strategy evaluation from broker availability.
///
/// `enqueue` never blocks. Queued messages are published in FIFO order, one
/// at a time; a failing publish is retried until it succeeds or shutdown.
pub struct ActionDispatcher {
    sender: mpsc::UnboundedSender<OutboundMessage>,
    receiver: Mutex<mpsc::UnboundedReceiver<OutboundMessage>>,
    /// Messages accepted but not yet taken off the queue
    queued: AtomicUsize,
    connector: Arc<dyn BrokerConnector>,
    /// Cached channel, dropped after any publish failure
    channel: Mutex<Option<Box<dyn BrokerChannel>>>,
    exchange: String,
    recovery_interval: Duration,
}

impl ActionDispatcher {
    pub fn new(connector: Arc<dyn BrokerConnector>, exchange: impl Into<String>, recovery_interval: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            queued: AtomicUsize::new(0),
            connector,
            channel: Mutex::new(None),
            exchange: exchange.into(),
            recovery_interval,
        }
    }

    /// Number of queued messages not yet picked up for publishing.
    pub fn pending(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Publish everything currently queued, then return.
    ///
    /// For use when `run` is not active: both hold the queue for their whole
    /// duration, so a `drain` started alongside `run` waits until `run` exits.
    pub async fn drain(&self, shutdown: &Shutdown) -> Result<DrainReport, Cancelled> {
        let mut receiver = self.receiver.lock().await;
        let mut report = DrainReport::default();

        while let Ok(message) = receiver.try_recv() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            if let Some(retries) = self.deliver(message, shutdown).await? {
                report.published += 1;
                report.retries += retries;
            }
        }

        Ok(report)
    }

    /// Publish queued messages as they arrive until shutdown.
    ///
    /// Once this returns the dispatcher is closed and `enqueue` fails.
    pub async fn run(&self, shutdown: &Shutdown) {
        info!(exchange = %self.exchange, "Trade action dispatcher is starting");
        let mut receiver = self.receiver.lock().await;

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                message = receiver.recv() => message,
            };

            let Some(message) = message else { break };
            self.queued.fetch_sub(1, Ordering::SeqCst);

            if self.deliver(message, shutdown).await.is_err() {
                break;
            }
        }

        receiver.close();
        let mut abandoned = 0;
        while receiver.try_recv().is_ok() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!(abandoned, "Trade actions left unpublished at shutdown");
        }

        info!("Trade action dispatcher is stopping");
    }

    /// Publish one message, retrying until it is confirmed.
    ///
    /// Returns the retry count, or `None` if the message could not be encoded
    /// and was dropped.
    async fn deliver(&self, message: OutboundMessage, shutdown: &Shutdown) -> Result<Option<u32>, Cancelled> {
        let body = match message.to_body() {
            Ok(body) => body,
            Err(e) => {
                error!(id = %message.id, error = %e, "Failed to encode trade action, dropping it");
                return Ok(None);
            }
        };

        let result = retry_with_backoff("trade action publish", self.recovery_interval, shutdown, || {
            self.publish(&body)
        })
        .await;

        match result {
            Ok(published) => {
                info!(
                    id = %message.id,
                    ticker = %message.ticker,
                    action = %message.action,
                    quantity = message.quantity,
                    retries = published.retries,
                    "Message published successfully."
                );
                Ok(Some(published.retries))
            }
            Err(Cancelled) => {
                warn!(id = %message.id, ticker = %message.ticker, "Publish cancelled by shutdown, trade action abandoned");
                Err(Cancelled)
            }
        }
    }

    async fn publish(&self, body: &[u8]) -> anyhow::Result<()> {
        let mut channel = self.channel.lock().await;

        if channel.is_none() {
            let opened = self
                .connector
                .connect()
                .await
                .context("Failed to open broker channel")?;
            *channel = Some(opened);
        }

        let Some(open) = channel.as_ref() else {
            anyhow::bail!("Broker channel unavailable");
        };

        let result = open.publish(&self.exchange, ROUTING_KEY, body, true).await;
        if result.is_err() {
            // Force a reconnect on the next attempt.
            *channel = None;
        }
        result.context("Failed to publish message")
    }
}

impl TradeActionSink for ActionDispatcher {
    fn enqueue(&self, ticker: &str, quantity: u64, action: TradeAction) -> Result<Uuid, DispatchError> {
        let message = OutboundMessage::new(ticker, quantity, action);
        let id = message.id;

        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(message).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(DispatchError::Closed);
        }

        debug!(%id, %ticker, %action, quantity, "Trade action queued");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::traits::{MockBrokerChannel, MockBrokerConnector};
    use anyhow::anyhow;
    use mockall::Sequence;

    fn channel_expecting(publishes: usize) -> MockBrokerChannel {
        let mut channel = MockBrokerChannel::new();
        channel
            .expect_publish()
            .withf(|exchange, routing_key, body, mandatory| {
                exchange == "trade-actions" && routing_key.is_empty() && !body.is_empty() && *mandatory
            })
            .times(publishes)
            .returning(|_, _, _, _| Ok(()));
        channel
    }

    fn boxed(channel: MockBrokerChannel) -> Box<dyn BrokerChannel> {
        Box::new(channel)
    }

    fn dispatcher(connector: MockBrokerConnector, recovery: Duration) -> ActionDispatcher {
        ActionDispatcher::new(Arc::new(connector), "trade-actions", recovery)
    }

    #[tokio::test]
    async fn test_connect_failure_is_retried_once() {
        let mut connector = MockBrokerConnector::new();
        let mut seq = Sequence::new();
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(anyhow!("connection refused")));
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(boxed(channel_expecting(1))));

        let dispatcher = dispatcher(connector, Duration::from_millis(10));
        dispatcher.enqueue("TEST", 3, TradeAction::Buy).unwrap();
        assert_eq!(dispatcher.pending(), 1);

        let report = dispatcher.drain(&Shutdown::new()).await.unwrap();
        assert_eq!(report, DrainReport { published: 1, retries: 1 });
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_never_connects() {
        let mut connector = MockBrokerConnector::new();
        connector.expect_connect().never();

        let dispatcher = dispatcher(connector, Duration::from_millis(10));
        let report = dispatcher.drain(&Shutdown::new()).await.unwrap();
        assert_eq!(report, DrainReport::default());
    }

    #[tokio::test]
    async fn test_channel_is_reused_across_messages() {
        let mut connector = MockBrokerConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|| Ok(boxed(channel_expecting(3))));

        let dispatcher = dispatcher(connector, Duration::from_millis(10));
        for ticker in ["IBM", "AMZN", "AAPL"] {
            dispatcher.enqueue(ticker, 1, TradeAction::Sell).unwrap();
        }

        let report = dispatcher.drain(&Shutdown::new()).await.unwrap();
        assert_eq!(report.published, 3);
        assert_eq!(report.retries, 0);
    }

    #[tokio::test]
    async fn test_failed_publish_reconnects() {
        let mut failing = MockBrokerChannel::new();
        failing
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| Err(anyhow!("channel closed")));

        let mut connector = MockBrokerConnector::new();
        let mut seq = Sequence::new();
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move || Ok(boxed(failing)));
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(boxed(channel_expecting(1))));

        let dispatcher = dispatcher(connector, Duration::from_millis(10));
        dispatcher.enqueue("IBM", 1, TradeAction::Buy).unwrap();

        let report = dispatcher.drain(&Shutdown::new()).await.unwrap();
        assert_eq!(report, DrainReport { published: 1, retries: 1 });
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_exits_promptly() {
        let mut connector = MockBrokerConnector::new();
        connector
            .expect_connect()
            .returning(|| Err(anyhow!("connection refused")));

        let dispatcher = Arc::new(dispatcher(connector, Duration::from_secs(60)));
        dispatcher.enqueue("IBM", 1, TradeAction::Buy).unwrap();

        let shutdown = Shutdown::new();
        let runner = {
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { dispatcher.run(&shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("dispatcher should not wait out its 60s backoff")
            .unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_after_run_exits_is_refused() {
        let mut connector = MockBrokerConnector::new();
        connector.expect_connect().never();

        let dispatcher = dispatcher(connector, Duration::from_millis(10));
        let shutdown = Shutdown::new();
        shutdown.trigger();
        dispatcher.run(&shutdown).await;

        assert_eq!(
            dispatcher.enqueue("IBM", 1, TradeAction::Buy),
            Err(DispatchError::Closed)
        );
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_run_publishes_in_enqueue_order() {
        let published = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut channel = MockBrokerChannel::new();
        {
            let published = published.clone();
            channel.expect_publish().returning(move |_, _, body, _| {
                let message: OutboundMessage = serde_json::from_slice(body).unwrap();
                published.lock().unwrap().push(message.ticker);
                Ok(())
            });
        }
        let mut connector = MockBrokerConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move || Ok(boxed(channel)));

        let dispatcher = Arc::new(dispatcher(connector, Duration::from_millis(10)));
        let shutdown = Shutdown::new();
        let runner = {
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { dispatcher.run(&shutdown).await })
        };

        for ticker in ["IBM", "AMZN", "AAPL"] {
            dispatcher.enqueue(ticker, 1, TradeAction::Buy).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while published.lock().unwrap().len() < 3 {
            assert!(std::time::Instant::now() < deadline, "messages were not published");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*published.lock().unwrap(), vec!["IBM", "AMZN", "AAPL"]);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .unwrap()
            .unwrap();
    }
}
