use crate::error::{RouterError, RouterResult};
use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;

/// Funds deposited to the batch and not yet deployed to strategies,
/// token -> native amount.
#[derive(Clone, Debug, Default)]
pub struct BatchPool {
    balances: BTreeMap<Address, U256>,
}

impl BatchPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, token: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        *self.balances.entry(token).or_default() += amount;
    }

    pub fn withdraw(&mut self, token: Address, amount: U256) -> RouterResult<()> {
        let available = self.balance(token);
        if amount > available {
            return Err(RouterError::InsufficientBalance { requested: amount, available });
        }
        if amount == available {
            self.balances.remove(&token);
        } else {
            self.balances.insert(token, available - amount);
        }
        Ok(())
    }

    pub fn balance(&self, token: Address) -> U256 {
        self.balances.get(&token).copied().unwrap_or_default()
    }

    /// Non-zero balances ordered by token address.
    pub fn balances(&self) -> Vec<(Address, U256)> {
        self.balances.iter().map(|(token, amount)| (*token, *amount)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}
