use super::{Strategy, StrategyId, StrategyState};
use crate::error::{RouterError, RouterResult};
use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct StrategyEntry {
    pub id: StrategyId,
    pub token: Address,
    pub weight: u64,
    pub state: StrategyState,
    pub strategy: Box<dyn Strategy>,
}

impl StrategyEntry {
    pub fn address(&self) -> Address {
        self.strategy.get_address()
    }

    pub fn is_active(&self) -> bool {
        self.state == StrategyState::Active
    }
}

/// Arena of strategies. `active` keeps the ordered list callers address by
/// index; removal is swap-with-last + pop, so an index may refer to a
/// different strategy after any `remove_at`. Use [`StrategyId`] to keep a
/// stable handle.
#[derive(Clone, Debug, Default)]
pub struct StrategyRegistry {
    next_id: u64,
    active: Vec<StrategyId>,
    entries: BTreeMap<StrategyId, StrategyEntry>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, strategy: Box<dyn Strategy>, token: Address, weight: u64) -> RouterResult<StrategyId> {
        let address = strategy.get_address();
        if self.active_entries().any(|entry| entry.address() == address) {
            return Err(RouterError::DuplicateStrategy(address));
        }
        if strategy.deposit_token() != token {
            return Err(RouterError::StrategyTokenMismatch { expected: token, actual: strategy.deposit_token() });
        }
        if weight == 0 {
            return Err(RouterError::InvalidParameter { name: "weight", reason: "must be positive".to_string() });
        }

        self.next_id += 1;
        let id = StrategyId(self.next_id);
        self.entries.insert(id, StrategyEntry { id, token, weight, state: StrategyState::Active, strategy });
        self.active.push(id);
        Ok(id)
    }

    /// Deactivate the strategy at `index`. The entry stays in the arena in the
    /// terminal `Removed` state.
    pub fn remove_at(&mut self, index: usize) -> RouterResult<StrategyId> {
        if index >= self.active.len() {
            return Err(RouterError::InvalidIndex { index, len: self.active.len() });
        }
        let id = self.active.swap_remove(index);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = StrategyState::Removed;
        }
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn id_at(&self, index: usize) -> RouterResult<StrategyId> {
        self.active.get(index).copied().ok_or(RouterError::InvalidIndex { index, len: self.active.len() })
    }

    pub fn active_ids(&self) -> Vec<StrategyId> {
        self.active.clone()
    }

    pub fn active_entries(&self) -> impl Iterator<Item = &StrategyEntry> {
        self.active.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn get(&self, id: StrategyId) -> RouterResult<&StrategyEntry> {
        self.entries.get(&id).ok_or(RouterError::StrategyNotFound(id))
    }

    pub fn get_mut(&mut self, id: StrategyId) -> RouterResult<&mut StrategyEntry> {
        self.entries.get_mut(&id).ok_or(RouterError::StrategyNotFound(id))
    }

    pub fn total_weight(&self) -> U256 {
        self.active_entries().fold(U256::ZERO, |acc, entry| acc + U256::from(entry.weight))
    }

    pub fn token_weight(&self, token: Address) -> U256 {
        self.active_entries().filter(|entry| entry.token == token).fold(U256::ZERO, |acc, entry| acc + U256::from(entry.weight))
    }

    /// Distinct tokens of active strategies, in registry order.
    pub fn tokens(&self) -> Vec<Address> {
        let mut tokens = Vec::new();
        for entry in self.active_entries() {
            if !tokens.contains(&entry.token) {
                tokens.push(entry.token);
            }
        }
        tokens
    }

    pub fn uses_token(&self, token: Address) -> bool {
        self.active_entries().any(|entry| entry.token == token)
    }
}
