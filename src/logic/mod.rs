/// Logic Layer - Accounting Engine
///
/// This layer is responsible for:
/// - Cycle settlement: deploying the batch and pricing its receipts in shares
/// - Withdrawal routing across the batch, the strategies and share balances
/// - Rebalancing the batch and deployed funds toward strategy weights
/// - Strategy registration and removal with redistribution

pub mod router;
pub mod types;
mod state;
mod cycle;
mod withdraw;
mod rebalance;

#[cfg(test)]
mod tests;

pub use router::{StrategyRouter, StrategyRouterBuilder};
pub use types::{
    BatchRebalance, BatchValue, CycleInfo, CycleSettlement, RouterEvent, RouterEventKind, StrategiesValue, StrategyInfo,
};
