//! Broker-agnostic traits for publishing trade actions.

use crate::error::DispatchError;
use crate::strategy::TradeAction;
use async_trait::async_trait;
use uuid::Uuid;

/// Opens channels to the message broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Box<dyn BrokerChannel>>;
}

/// An open channel able to publish to an exchange.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Publish `body`. With `mandatory`, an unroutable message is an error.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        mandatory: bool,
    ) -> anyhow::Result<()>;
}

/// Accepts trade actions for asynchronous delivery.
#[cfg_attr(test, mockall::automock)]
pub trait TradeActionSink: Send + Sync {
    /// Queue a trade action without blocking. Returns the message ID.
    fn enqueue(&self, ticker: &str, quantity: u64, action: TradeAction) -> Result<Uuid, DispatchError>;
}

