//! Trade action delivery to the message broker.
//!
//! Triggered strategies hand their action to the `ActionDispatcher`, which
//! queues it locally and publishes it to a broker exchange, retrying with a
//! fixed backoff whenever the broker is unreachable.

mod broker;
mod dispatcher;
mod traits;
mod types;

pub use broker::{HttpBrokerChannel, HttpBrokerConnector};
pub use dispatcher::ActionDispatcher;
pub use traits::{BrokerChannel, BrokerConnector, TradeActionSink};
pub use types::{DrainReport, OutboundMessage};

#[cfg(test)]
pub use traits::MockTradeActionSink;
