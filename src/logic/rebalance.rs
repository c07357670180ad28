use super::state::RouterContext;
use super::types::{BatchRebalance, RouterEvent, StrategiesValue};
use crate::batching::{SwapLeg, plan_swap_legs};
use crate::error::{RouterError, RouterResult};
use crate::strategies::{Strategy, StrategyId};
use crate::utils::mul_div;
use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;
use tracing::{debug, info};

impl RouterContext<'_> {
    /// Swap batch funds toward the token mix implied by strategy weights and
    /// split each token balance among its strategies.
    pub(crate) fn rebalance_batch(&mut self) -> RouterResult<BatchRebalance> {
        if self.state.strategies.is_empty() {
            return Err(RouterError::NothingToRebalance);
        }
        let batch = self.state.batch_value(self.oracle)?;
        if batch.total.is_zero() {
            return Err(RouterError::NothingToRebalance);
        }

        let values: BTreeMap<Address, U256> = batch.balances.iter().map(|(token, _, usd)| (*token, *usd)).collect();
        let total_weight = self.state.strategies.total_weight();
        let targets = self
            .state
            .strategies
            .tokens()
            .into_iter()
            .map(|token| Ok((token, mul_div(batch.total, self.state.strategies.token_weight(token), total_weight)?)))
            .collect::<RouterResult<BTreeMap<Address, U256>>>()?;

        let legs = plan_swap_legs(&values, &targets, self.state.config.rebalance_swap_threshold);
        for leg in &legs {
            let value = values.get(&leg.from).copied().unwrap_or_default();
            self.execute_batch_leg(leg, value)?;
        }

        let mut allocations = Vec::new();
        for token in self.state.strategies.tokens() {
            let balance = self.state.batch.balance(token);
            let token_weight = self.state.strategies.token_weight(token);
            let members: Vec<(StrategyId, u64)> = self
                .state
                .strategies
                .active_entries()
                .filter(|entry| entry.token == token)
                .map(|entry| (entry.id, entry.weight))
                .collect();

            let mut assigned = U256::ZERO;
            for (i, (id, weight)) in members.iter().enumerate() {
                let amount = if i + 1 == members.len() {
                    balance - assigned
                } else {
                    mul_div(balance, U256::from(*weight), token_weight)?
                };
                assigned += amount;
                allocations.push((*id, amount));
            }
        }

        debug!(total = %batch.total, swaps = legs.len(), "batch rebalanced");
        Ok(BatchRebalance { total_before: batch.total, balances: self.state.batch.balances(), allocations, swaps: legs.len() })
    }

    fn execute_batch_leg(&mut self, leg: &SwapLeg, from_value: U256) -> RouterResult<()> {
        let balance = self.state.batch.balance(leg.from);
        let amount = if leg.usd >= from_value { balance } else { self.amount_for_usd(leg.from, leg.usd)?.min(balance) };
        if amount.is_zero() {
            return Ok(());
        }
        self.state.batch.withdraw(leg.from, amount)?;
        let received = self.swap(leg.from, leg.to, amount)?;
        self.state.batch.deposit(leg.to, received);
        Ok(())
    }

    /// Move deployed funds between strategies until each holds its weight
    /// share of the total, within the swap threshold.
    pub(crate) fn rebalance_strategies(&mut self) -> RouterResult<StrategiesValue> {
        if self.state.strategies.is_empty() {
            return Err(RouterError::NothingToRebalance);
        }
        let before = self.state.strategies_value(self.oracle)?;
        if before.total.is_zero() {
            return Err(RouterError::NothingToRebalance);
        }
        let threshold = self.state.config.rebalance_swap_threshold;
        let total_weight = self.state.strategies.total_weight();

        let mut deficits = Vec::new();
        let mut holdings: BTreeMap<Address, U256> = BTreeMap::new();
        for (id, value) in &before.values {
            let entry = self.state.strategies.get(*id)?;
            let (token, tokens_held) = (entry.token, entry.strategy.total_tokens());
            let target = mul_div(before.total, U256::from(entry.weight), total_weight)?;

            if *value > target && *value - target >= threshold {
                let amount = self.amount_for_usd(token, *value - target)?.min(tokens_held);
                let withdrawn = self.state.strategies.get_mut(*id)?.strategy.withdraw(amount)?;
                *holdings.entry(token).or_default() += withdrawn;
            } else if target > *value && target - *value >= threshold {
                deficits.push((*id, token, target - *value));
            }
        }

        for (id, token, mut need_usd) in deficits {
            // same token first, then anything else through the exchange
            let mut sources: Vec<Address> = vec![token];
            sources.extend(holdings.keys().filter(|t| **t != token).copied());

            for source in sources {
                if need_usd.is_zero() {
                    break;
                }
                let held = holdings.get(&source).copied().unwrap_or_default();
                if held.is_zero() {
                    continue;
                }
                let held_usd = self.usd_value(source, held)?;
                let (amount, covered) = if held_usd <= need_usd {
                    (held, held_usd)
                } else {
                    (self.amount_for_usd(source, need_usd)?.min(held), need_usd)
                };
                holdings.insert(source, held - amount);
                need_usd -= covered;

                let received = self.swap(source, token, amount)?;
                self.state.strategies.get_mut(id)?.strategy.deposit(received)?;
            }
        }

        for (token, amount) in holdings {
            if amount.is_zero() {
                continue;
            }
            let home = self
                .state
                .strategies
                .active_entries()
                .find(|entry| entry.token == token)
                .map(|entry| entry.id)
                .ok_or(RouterError::NoActiveStrategies)?;
            self.state.strategies.get_mut(home)?.strategy.deposit(amount)?;
        }

        let after = self.state.strategies_value(self.oracle)?;
        info!(before = %before.total, after = %after.total, "strategies rebalanced");
        self.emit(RouterEvent::StrategiesRebalanced { total_usd: after.total });
        Ok(after)
    }

    pub(crate) fn add_strategy(&mut self, strategy: Box<dyn Strategy>, token: Address, weight: u64) -> RouterResult<StrategyId> {
        self.state.ensure_supported(token)?;
        let address = strategy.get_address();
        let id = self.state.strategies.add(strategy, token, weight)?;
        info!(%id, %address, %token, weight, "strategy added");
        self.emit(RouterEvent::StrategyAdded { id, address, token, weight });
        Ok(id)
    }

    /// Withdraw everything from the strategy at `index`, swap-remove it and
    /// spread the funds over the remaining strategies by weight.
    pub(crate) fn remove_strategy(&mut self, index: usize) -> RouterResult<StrategyId> {
        let len = self.state.strategies.len();
        if index >= len {
            return Err(RouterError::InvalidIndex { index, len });
        }
        if len == 1 {
            return Err(RouterError::CannotRemoveLastStrategy);
        }

        let id = self.state.strategies.id_at(index)?;
        let entry = self.state.strategies.get_mut(id)?;
        let (token, address) = (entry.token, entry.address());
        let withdrawn = entry.strategy.withdraw_all()?;
        self.state.strategies.remove_at(index)?;

        let remaining: Vec<(StrategyId, Address, u64)> =
            self.state.strategies.active_entries().map(|entry| (entry.id, entry.token, entry.weight)).collect();
        let total_weight = self.state.strategies.total_weight();
        let mut assigned = U256::ZERO;
        for (i, (target_id, target_token, weight)) in remaining.iter().enumerate() {
            let part = if i + 1 == remaining.len() {
                withdrawn - assigned
            } else {
                mul_div(withdrawn, U256::from(*weight), total_weight)?
            };
            assigned += part;
            let received = self.swap(token, *target_token, part)?;
            if !received.is_zero() {
                self.state.strategies.get_mut(*target_id)?.strategy.deposit(received)?;
            }
        }

        info!(%id, %address, %withdrawn, "strategy removed");
        self.emit(RouterEvent::StrategyRemoved { id, address, redistributed: withdrawn });
        Ok(id)
    }
}
