// Layered Architecture
pub mod external;   // External Layer: price oracle and exchange interfaces
pub mod strategies; // Strategy Layer: yield strategy trait and registry
pub mod ledgers;    // Ledger Layer: receipts and shares
pub mod batching;   // Batch Layer: pending funds and swap planning
pub mod logic;      // Logic Layer: cycles, withdrawal routing, rebalancing

// Common utilities and types
pub mod config;
pub mod error;
pub mod utils;

// Re-export key components from each layer
pub use batching::{BatchPool, SwapLeg, plan_swap_legs};
pub use config::{DeploymentConfig, RouterConfig, StrategyConfig, TokenConfig};
pub use error::{RouterError, RouterResult};
pub use external::{Exchange, ExternalError, FixedPriceOracle, OracleExchange, PriceOracle};
pub use ledgers::{Receipt, ReceiptLedger, ShareLedger};
pub use logic::{
    BatchRebalance, BatchValue, CycleInfo, CycleSettlement, RouterEvent, RouterEventKind, StrategiesValue, StrategyInfo,
    StrategyRouter, StrategyRouterBuilder,
};
pub use strategies::{MockStrategy, Strategy, StrategyEntry, StrategyError, StrategyId, StrategyRegistry, StrategyState};
pub use utils::{MAX_AMOUNT, MathError, PRECISION, Token};
