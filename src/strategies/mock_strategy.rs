use super::{Strategy, StrategyError};
use crate::utils::apply_bps;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// In-memory strategy holding its deposit token. `profit_bps` of the balance
/// is added on every compound.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MockStrategy {
    pub address: Address,
    pub token: Address,
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub profit_bps: u64,
    #[serde(default)]
    pub paused: bool,
}

impl MockStrategy {
    pub fn new(address: Address, token: Address) -> Self {
        Self { address, token, balance: U256::ZERO, profit_bps: 0, paused: false }
    }

    pub fn with_profit_bps(mut self, profit_bps: u64) -> Self {
        self.profit_bps = profit_bps;
        self
    }

    fn ensure_live(&self) -> Result<(), StrategyError> {
        if self.paused { Err(StrategyError::Paused(self.address)) } else { Ok(()) }
    }
}

#[typetag::serde]
impl Strategy for MockStrategy {
    fn get_address(&self) -> Address {
        self.address
    }

    fn deposit_token(&self) -> Address {
        self.token
    }

    fn deposit(&mut self, amount: U256) -> Result<(), StrategyError> {
        self.ensure_live()?;
        self.balance += amount;
        Ok(())
    }

    fn withdraw(&mut self, amount: U256) -> Result<U256, StrategyError> {
        self.ensure_live()?;
        let released = amount.min(self.balance);
        self.balance -= released;
        Ok(released)
    }

    fn withdraw_all(&mut self) -> Result<U256, StrategyError> {
        self.ensure_live()?;
        Ok(std::mem::take(&mut self.balance))
    }

    fn compound(&mut self) -> Result<U256, StrategyError> {
        self.ensure_live()?;
        let gain = apply_bps(self.balance, self.profit_bps)?;
        self.balance += gain;
        Ok(gain)
    }

    fn total_tokens(&self) -> U256 {
        self.balance
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}
