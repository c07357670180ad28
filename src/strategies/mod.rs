pub mod strategy;
pub mod registry;
pub mod mock_strategy;

pub use strategy::{Strategy, StrategyError, StrategyId, StrategyState};
pub use registry::{StrategyEntry, StrategyRegistry};
pub use mock_strategy::MockStrategy;
