use crate::error::{RouterError, RouterResult};
use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;

/// Fungible share balances. Shares minted by a cycle sit in the router pool
/// until receipt owners unlock them, so
/// `sum(balances) + pool == total_supply` always holds.
#[derive(Clone, Debug, Default)]
pub struct ShareLedger {
    balances: BTreeMap<Address, U256>,
    pool: U256,
    total_supply: U256,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or_default()
    }

    pub fn pool(&self) -> U256 {
        self.pool
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn mint(&mut self, holder: Address, shares: U256) {
        *self.balances.entry(holder).or_default() += shares;
        self.total_supply += shares;
    }

    pub fn mint_to_pool(&mut self, shares: U256) {
        self.pool += shares;
        self.total_supply += shares;
    }

    /// Move `shares` from the router pool to `holder`.
    pub fn release(&mut self, holder: Address, shares: U256) -> RouterResult<()> {
        if shares > self.pool {
            return Err(RouterError::InsufficientBalance { requested: shares, available: self.pool });
        }
        self.pool -= shares;
        *self.balances.entry(holder).or_default() += shares;
        Ok(())
    }

    /// Move `shares` from `holder` back into the router pool.
    pub fn retain(&mut self, holder: Address, shares: U256) -> RouterResult<()> {
        self.debit(holder, shares)?;
        self.pool += shares;
        Ok(())
    }

    pub fn burn(&mut self, holder: Address, shares: U256) -> RouterResult<()> {
        self.debit(holder, shares)?;
        self.total_supply -= shares;
        Ok(())
    }

    /// Burn up to `shares` from the pool; returns what was burned.
    pub fn burn_from_pool(&mut self, shares: U256) -> U256 {
        let burned = shares.min(self.pool);
        self.pool -= burned;
        self.total_supply -= burned;
        burned
    }

    pub fn transfer(&mut self, from: Address, to: Address, shares: U256) -> RouterResult<()> {
        self.debit(from, shares)?;
        *self.balances.entry(to).or_default() += shares;
        Ok(())
    }

    fn debit(&mut self, holder: Address, shares: U256) -> RouterResult<()> {
        let available = self.balance_of(holder);
        if shares > available {
            return Err(RouterError::InsufficientBalance { requested: shares, available });
        }
        let remaining = available - shares;
        if remaining.is_zero() {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, remaining);
        }
        Ok(())
    }

    pub(crate) fn sum_of_balances(&self) -> U256 {
        self.balances.values().fold(U256::ZERO, |acc, v| acc + *v)
    }
}
