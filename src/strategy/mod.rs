//! Price-triggered trading strategies.
//!
//! - `StrategyStore`: validated, concurrent registry of active strategies
//! - `StrategyEvaluator`: periodic loop firing strategies whose threshold is hit

mod evaluator;
mod store;
mod types;

pub use evaluator::{StrategyEvaluator, TickReport};
pub use store::StrategyStore;
pub use types::{Strategy, StrategyRequest, StrategyUpdate, TradeAction};
