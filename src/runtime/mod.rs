//! Long-running task plumbing shared by the price feed, the strategy
//! evaluator and the trade action dispatcher.
//!
//! - `Shutdown`: process-wide cancellation observable at every await point
//! - `retry_with_backoff`: log, wait a fixed interval, retry until success
//! - `run_periodic`: fixed-interval tick loop that exits promptly on shutdown

mod periodic;
mod retry;
mod shutdown;

pub use periodic::run_periodic;
pub use retry::{retry_with_backoff, Cancelled, Retried};
pub use shutdown::Shutdown;
