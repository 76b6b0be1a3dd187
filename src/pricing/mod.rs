//! Ticker price feed.
//!
//! Keeps a map of the latest price per known ticker, fed by one of:
//! - Quote REST API, polled on a fixed interval
//! - Trade stream WebSocket, merging incremental updates
//!
//! Both are retried indefinitely with a fixed backoff until shutdown.

mod client;
mod feed;
mod traits;
mod types;
mod websocket;

pub use client::QuoteClient;
pub use feed::PriceFeed;
pub use traits::{PriceSource, PriceStreamSource, PriceUpdateStream, QuoteSource};
pub use types::{PriceSnapshot, PriceUpdate, Quote};
pub use websocket::StreamClient;
