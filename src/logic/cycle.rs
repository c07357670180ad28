use super::state::RouterContext;
use super::types::{CycleInfo, CycleSettlement, RouterEvent};
use crate::error::{RouterError, RouterResult};
use crate::utils::{INITIAL_SHARES_PER_UNIT, PRECISION, apply_bps, mul_div, uniform_to_float};
use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl RouterContext<'_> {
    pub(crate) fn deposit_to_batch(&mut self, caller: Address, token: Address, amount: U256) -> RouterResult<u64> {
        self.state.ensure_supported(token)?;
        let usd = self.usd_value(token, amount)?;
        let minimum = self.state.config.min_deposit;
        if amount.is_zero() || usd < minimum {
            return Err(RouterError::BelowMinimum { value: usd, minimum });
        }

        self.state.batch.deposit(token, amount);
        let cycle_id = self.state.current_cycle;
        let receipt_id = self.state.receipts.mint(caller, token, amount, cycle_id);
        debug!(receipt_id, %caller, %token, %amount, %usd, cycle_id, "deposited to batch");
        self.emit(RouterEvent::Deposit { receipt_id, owner: caller, token, amount });
        Ok(receipt_id)
    }

    /// Compound every active strategy and mint the performance fee on the
    /// realized yield. Returns the yield and the fee shares minted.
    pub(crate) fn compound_and_charge_fee(&mut self) -> RouterResult<(U256, U256)> {
        let before = self.state.strategies_value(self.oracle)?.total;
        for id in self.state.strategies.active_ids() {
            self.state.strategies.get_mut(id)?.strategy.compound()?;
        }
        let after = self.state.strategies_value(self.oracle)?.total;
        let gain = after.saturating_sub(before);

        let fee_usd = apply_bps(gain, self.state.config.fee_percent_bps)?;
        let supply = self.state.shares.total_supply();
        let holders_value = after + self.state.current_cycle_info()?.holder_batch_usd;
        let mut fee_shares = U256::ZERO;
        // fee shares dilute holders by exactly fee_usd
        if !fee_usd.is_zero() && !supply.is_zero() && holders_value > fee_usd {
            fee_shares = mul_div(fee_usd, supply, holders_value - fee_usd)?;
            let fee_address = self.state.config.fee_address;
            self.state.shares.mint(fee_address, fee_shares);
        }
        if !gain.is_zero() {
            self.emit(RouterEvent::Compounded { gain_usd: gain, fee_shares });
        }
        Ok((gain, fee_shares))
    }

    /// Close the current cycle: deploy the batch and settle its receipts.
    pub(crate) fn deposit_to_strategies(&mut self) -> RouterResult<CycleSettlement> {
        if self.state.strategies.is_empty() {
            return Err(RouterError::NoActiveStrategies);
        }
        let batch_usd = self.state.batch_value(self.oracle)?.total;
        let minimum = self.state.config.min_usd_per_cycle;
        if batch_usd.is_zero() || batch_usd < minimum {
            return Err(RouterError::BelowMinimum { value: batch_usd, minimum });
        }

        let cycle_id = self.state.current_cycle;
        let cycle = self.state.current_cycle_info()?;
        let (shares_bought, holder_usd) = (cycle.shares_bought, cycle.holder_batch_usd);
        let elapsed = self.state.timestamp.saturating_sub(cycle.started_at);
        let duration = self.state.config.cycle_duration_secs;
        if elapsed < duration {
            return Err(RouterError::CycleNotElapsed { cycle_id, remaining_secs: duration - elapsed });
        }

        let (_, fee_shares) = self.compound_and_charge_fee()?;
        let value_before = self.state.strategies_value(self.oracle)?.total;
        let shares_before = self.state.shares.total_supply();
        let holders_value = value_before + holder_usd;
        let price_per_share = if shares_before.is_zero() || holders_value.is_zero() {
            if !shares_before.is_zero() {
                warn!(cycle_id, %shares_before, "strategies hold no value, resetting price per share");
            }
            PRECISION / INITIAL_SHARES_PER_UNIT
        } else {
            mul_div(holders_value, PRECISION, shares_before)?
        };

        // value of this cycle's claims at close-time prices
        let pending: Vec<(Address, U256)> =
            self.state.receipts.pending_for_cycle(cycle_id).map(|receipt| (receipt.token, receipt.amount)).collect();
        let mut prices = BTreeMap::new();
        let mut pending_usd = U256::ZERO;
        for (token, amount) in pending {
            if !prices.contains_key(&token) {
                prices.insert(token, self.oracle.uniform_price_of(token)?);
            }
            pending_usd += self.usd_value(token, amount)?;
        }

        let plan = self.rebalance_batch()?;
        let mut sent_usd = U256::ZERO;
        for (id, amount) in &plan.allocations {
            if amount.is_zero() {
                continue;
            }
            let token = self.state.strategies.get(*id)?.token;
            self.state.batch.withdraw(token, *amount)?;
            self.state.strategies.get_mut(*id)?.strategy.deposit(*amount)?;
            sent_usd += self.usd_value(token, *amount)?;
        }

        let value_after = self.state.strategies_value(self.oracle)?.total;
        let received = value_after.saturating_sub(value_before);
        let bought_usd = mul_div(shares_bought, price_per_share, PRECISION)?;
        // the shareholders' part of the batch is not the depositors' to claim
        let deposited_usd = pending_usd.max((sent_usd + bought_usd).saturating_sub(holder_usd));
        let received_usd = (received + bought_usd).saturating_sub(holder_usd);

        let shares_minted = mul_div(received, PRECISION, price_per_share)?;
        self.state.shares.mint_to_pool(shares_minted);

        let owed = mul_div(mul_div(pending_usd, received_usd, deposited_usd)?, PRECISION, price_per_share)?;
        let surplus = (shares_minted + shares_bought).saturating_sub(owed);
        let shares_burned = self.state.shares.burn_from_pool(surplus);

        let settlement = CycleSettlement {
            closed_at: self.state.timestamp,
            price_per_share,
            received_usd,
            deposited_usd,
            prices,
            shares_minted,
            shares_burned,
            fee_shares,
        };
        self.state.current_cycle_mut()?.settlement = Some(settlement.clone());
        self.state.current_cycle += 1;
        let next = self.state.current_cycle;
        self.state.cycles.insert(next, CycleInfo::open(next, self.state.timestamp));

        info!(
            cycle_id,
            pps = uniform_to_float(price_per_share),
            %pending_usd, %sent_usd, %holder_usd, %received, %shares_minted, %shares_burned,
            "cycle closed"
        );
        self.emit(RouterEvent::CycleClosed { cycle_id, price_per_share, received_usd, shares_minted, fee_shares });
        Ok(settlement)
    }

    /// Convert processed receipts into shares credited to their owners.
    /// Unlockers may act on receipts they do not own when `allow_unlockers`.
    pub(crate) fn unlock_receipts(&mut self, caller: Address, receipt_ids: &[u64], allow_unlockers: bool) -> RouterResult<U256> {
        let is_unlocker = allow_unlockers && self.state.unlockers.contains(&caller);
        let mut unlocked: BTreeMap<Address, (Vec<u64>, U256)> = BTreeMap::new();
        let mut total = U256::ZERO;

        for &id in receipt_ids {
            let receipt = self.state.receipts.get(id)?.clone();
            if receipt.owner != caller && !is_unlocker {
                return Err(RouterError::Unauthorized { caller, reason: "not the receipt owner" });
            }
            // rounding can leave the pool a few wei short of the last claim
            let shares = self.state.receipt_shares(&receipt)?.min(self.state.shares.pool());
            self.state.shares.release(receipt.owner, shares)?;
            self.state.receipts.burn(id)?;

            let entry = unlocked.entry(receipt.owner).or_default();
            entry.0.push(id);
            entry.1 += shares;
            total += shares;
        }

        for (owner, (receipt_ids, shares)) in unlocked {
            debug!(%owner, ?receipt_ids, %shares, "shares unlocked");
            self.emit(RouterEvent::SharesUnlocked { owner, receipt_ids, shares });
        }
        Ok(total)
    }
}
