use crate::strategies::{StrategyId, StrategyState};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumDiscriminants};

/// One batching cycle. `settlement` is filled when the cycle closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleInfo {
    pub id: u64,
    /// Block timestamp the cycle opened at
    pub started_at: u64,
    /// Shares moved into the router pool by cross withdrawals paid from this
    /// cycle's batch
    pub shares_bought: U256,
    /// Batch value owned by shareholders: receipts of this cycle paid out of
    /// strategies left their funds behind
    pub holder_batch_usd: U256,
    pub settlement: Option<CycleSettlement>,
}

impl CycleInfo {
    pub fn open(id: u64, started_at: u64) -> Self {
        Self { id, started_at, shares_bought: U256::ZERO, holder_batch_usd: U256::ZERO, settlement: None }
    }

    pub fn is_closed(&self) -> bool {
        self.settlement.is_some()
    }
}

/// Snapshot taken when a cycle's batch is deployed. A receipt of the cycle
/// converts to `usd * received_usd / deposited_usd / price_per_share` shares,
/// with `usd` valued at `prices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSettlement {
    pub closed_at: u64,
    /// Uniform USD per share, scaled by 1e18
    pub price_per_share: U256,
    /// Value the cycle's claims are entitled to after slippage
    pub received_usd: U256,
    /// Nominal value those claims were measured against
    pub deposited_usd: U256,
    /// Uniform USD prices of every receipt token pending at close
    pub prices: BTreeMap<Address, U256>,
    pub shares_minted: U256,
    pub shares_burned: U256,
    pub fee_shares: U256,
}

/// Outcome of rebalancing the batch toward strategy weights.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRebalance {
    /// Batch value before any swap
    pub total_before: U256,
    /// Batch balances after the swaps, native units
    pub balances: Vec<(Address, U256)>,
    /// Amount of its token each active strategy should receive, native units
    pub allocations: Vec<(StrategyId, U256)>,
    pub swaps: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategiesValue {
    pub total: U256,
    pub values: Vec<(StrategyId, U256)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyInfo {
    pub id: StrategyId,
    pub address: Address,
    pub token: Address,
    pub weight: u64,
    pub state: StrategyState,
    /// Deposit-token balance held by the strategy
    pub tokens: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchValue {
    pub total: U256,
    /// token, native balance, uniform USD value
    pub balances: Vec<(Address, U256, U256)>,
}

/// State transitions recorded by the router, drained with
/// `StrategyRouter::take_events`.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumDiscriminants, Serialize)]
#[strum_discriminants(name(RouterEventKind), derive(Display, Hash))]
pub enum RouterEvent {
    Deposit { receipt_id: u64, owner: Address, token: Address, amount: U256 },
    CycleClosed { cycle_id: u64, price_per_share: U256, received_usd: U256, shares_minted: U256, fee_shares: U256 },
    SharesUnlocked { owner: Address, receipt_ids: Vec<u64>, shares: U256 },
    WithdrawFromBatching { caller: Address, receipt_ids: Vec<u64>, token: Address, payout: U256 },
    WithdrawFromStrategies { caller: Address, shares: U256, token: Address, payout: U256 },
    CrossWithdrawFromBatching { caller: Address, shares: U256, shares_to_pool: U256, token: Address, payout: U256 },
    CrossWithdrawFromStrategies { caller: Address, receipt_ids: Vec<u64>, token: Address, payout: U256 },
    BatchRebalanced { total_usd: U256, swaps: usize },
    StrategiesRebalanced { total_usd: U256 },
    Compounded { gain_usd: U256, fee_shares: U256 },
    StrategyAdded { id: StrategyId, address: Address, token: Address, weight: u64 },
    StrategyRemoved { id: StrategyId, address: Address, redistributed: U256 },
    SupportedTokenChanged { token: Address, supported: bool },
    UnlockerChanged { unlocker: Address, allowed: bool },
    ConfigUpdated,
    SharesTransferred { from: Address, to: Address, shares: U256 },
    ReceiptTransferred { receipt_id: u64, from: Address, to: Address },
}
