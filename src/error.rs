use crate::external::ExternalError;
use crate::strategies::{StrategyError, StrategyId};
use crate::utils::{LoadConfigError, MathError};
use alloy_primitives::{Address, U256};

/// Every failure of a router entry point. A returned error means no ledger
/// was modified by the call.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("unauthorized caller {caller}: {reason}")]
    Unauthorized { caller: Address, reason: &'static str },
    #[error("unsupported token {0}")]
    UnsupportedToken(Address),
    #[error("token {0} is still used by an active strategy")]
    TokenInUse(Address),
    #[error("value {value} below minimum {minimum}")]
    BelowMinimum { value: U256, minimum: U256 },
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: U256, available: U256 },
    #[error("insufficient liquidity: {missing_usd} uniform USD could not be sourced")]
    InsufficientLiquidity { missing_usd: U256 },
    #[error("receipt {0} not found")]
    ReceiptNotFound(u64),
    #[error("receipt {0} belongs to a cycle that has not been processed")]
    ReceiptNotProcessed(u64),
    #[error("receipt {0} was already deployed to strategies")]
    ReceiptAlreadyProcessed(u64),
    #[error("cycle {cycle_id} can close in {remaining_secs}s")]
    CycleNotElapsed { cycle_id: u64, remaining_secs: u64 },
    #[error("nothing to rebalance")]
    NothingToRebalance,
    #[error("no active strategies")]
    NoActiveStrategies,
    #[error("strategy index {index} out of range ({len} active)")]
    InvalidIndex { index: usize, len: usize },
    #[error("cannot remove the last active strategy")]
    CannotRemoveLastStrategy,
    #[error("strategy {0} is already registered")]
    DuplicateStrategy(Address),
    #[error("strategy {0} not found")]
    StrategyNotFound(StrategyId),
    #[error("strategy deposits {actual}, registration says {expected}")]
    StrategyTokenMismatch { expected: Address, actual: Address },
    #[error("argument length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Config(#[from] LoadConfigError),
    #[error(transparent)]
    Math(#[from] MathError),
}

pub type RouterResult<T> = Result<T, RouterError>;
