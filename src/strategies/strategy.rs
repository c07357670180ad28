use crate::utils::MathError;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use strum_macros::{Display, EnumString, VariantNames};

/// Stable arena identifier of a registered strategy. Unlike positional
/// indices it never changes or gets reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrategyId(pub u64);

impl Display for StrategyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "strategy#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash, EnumString, VariantNames, Default, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyState {
    #[default]
    Active,
    Removed,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum StrategyError {
    #[error("strategy {0} is paused")]
    Paused(Address),
    #[error("strategy {address} rejected the call: {reason}")]
    Rejected { address: Address, reason: String },
    #[error(transparent)]
    Math(#[from] MathError),
}

/// Capability set every yield strategy exposes to the router. Amounts are in
/// the strategy's deposit token, native decimals.
#[typetag::serde(tag = "type")]
pub trait Strategy: Send + Sync {
    fn get_address(&self) -> Address;

    fn deposit_token(&self) -> Address;

    fn deposit(&mut self, amount: U256) -> Result<(), StrategyError>;

    /// Withdraw up to `amount`; returns what was actually released.
    fn withdraw(&mut self, amount: U256) -> Result<U256, StrategyError>;

    fn withdraw_all(&mut self) -> Result<U256, StrategyError>;

    /// Reinvest accrued rewards; returns the deposit-token gain.
    fn compound(&mut self) -> Result<U256, StrategyError> {
        Ok(U256::ZERO)
    }

    fn total_tokens(&self) -> U256;

    fn clone_box(&self) -> Box<dyn Strategy>;
}

impl Clone for Box<dyn Strategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Debug for dyn Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Strategy({:#}, token={:#}, total={})", self.get_address(), self.deposit_token(), self.total_tokens())
    }
}
