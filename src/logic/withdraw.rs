use super::state::RouterContext;
use super::types::RouterEvent;
use crate::error::{RouterError, RouterResult};
use crate::strategies::StrategyId;
use crate::utils::{MAX_AMOUNT, PRECISION, mul_div};
use alloy_primitives::{Address, U256};
use tracing::debug;

/// What a liquidity source paid out: `payout` in the withdraw token and the
/// uniform USD value it covered.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Payout {
    pub payout: U256,
    pub covered_usd: U256,
}

impl RouterContext<'_> {
    /// Validate and reduce unprocessed batch receipts of `caller`. Returns the
    /// (token, amount) each receipt is paid. A batch left short by swap fees
    /// pays every receipt of the cycle the same fraction of its amount.
    fn take_batch_receipts(
        &mut self,
        caller: Address,
        receipt_ids: &[u64],
        amounts: &[U256],
    ) -> RouterResult<Vec<(Address, U256)>> {
        if receipt_ids.len() != amounts.len() {
            return Err(RouterError::LengthMismatch { left: receipt_ids.len(), right: amounts.len() });
        }
        let (owed, backing) = self.state.batch_backing(self.oracle)?;
        let mut taken = Vec::with_capacity(receipt_ids.len());
        for (&id, &requested) in receipt_ids.iter().zip(amounts) {
            let receipt = self.state.receipts.get(id)?;
            if receipt.owner != caller {
                return Err(RouterError::Unauthorized { caller, reason: "not the receipt owner" });
            }
            if receipt.cycle_id < self.state.current_cycle {
                return Err(RouterError::ReceiptAlreadyProcessed(id));
            }
            let token = receipt.token;
            let amount = if requested == MAX_AMOUNT { receipt.amount } else { requested };
            self.state.receipts.reduce(id, amount)?;
            let paid = if backing < owed { mul_div(amount, backing, owed)? } else { amount };
            taken.push((token, paid));
        }
        Ok(taken)
    }

    /// Resolve `MAX_AMOUNT` and check the caller's unlocked balance.
    fn resolve_shares(&self, caller: Address, shares: U256) -> RouterResult<U256> {
        let available = self.state.shares.balance_of(caller);
        let shares = if shares == MAX_AMOUNT { available } else { shares };
        if shares.is_zero() {
            return Err(RouterError::InvalidParameter { name: "shares", reason: "must be positive".to_string() });
        }
        if shares > available {
            return Err(RouterError::InsufficientBalance { requested: shares, available });
        }
        Ok(shares)
    }

    /// Pay `amount` of a receipt's `token` out of the batch: the same token
    /// first, any shortfall by value from the other batch tokens.
    fn pay_receipt_from_batch(&mut self, token: Address, amount: U256, withdraw_token: Address) -> RouterResult<U256> {
        let direct = amount.min(self.state.batch.balance(token));
        self.state.batch.withdraw(token, direct)?;
        let mut payout = self.swap(token, withdraw_token, direct)?;

        if direct < amount {
            let missing_usd = self.usd_value(token, amount - direct)?;
            payout += self.take_from_batch(withdraw_token, missing_usd, false)?.payout;
        }
        Ok(payout)
    }

    /// Source `usd` from batch balances, `withdraw_token` first. With
    /// `allow_partial` a shortfall is returned instead of failing.
    pub(crate) fn take_from_batch(&mut self, withdraw_token: Address, usd: U256, allow_partial: bool) -> RouterResult<Payout> {
        let mut result = Payout::default();
        let mut order = vec![withdraw_token];
        order.extend(self.state.batch.balances().into_iter().map(|(token, _)| token).filter(|t| *t != withdraw_token));

        for token in order {
            let remaining = usd - result.covered_usd;
            if remaining.is_zero() {
                break;
            }
            let balance = self.state.batch.balance(token);
            if balance.is_zero() {
                continue;
            }
            let value = self.usd_value(token, balance)?;
            let (amount, covered) =
                if value <= remaining { (balance, value) } else { (self.amount_for_usd(token, remaining)?.min(balance), remaining) };

            self.state.batch.withdraw(token, amount)?;
            result.payout += self.swap(token, withdraw_token, amount)?;
            result.covered_usd += covered;
        }

        self.check_shortfall(usd - result.covered_usd, allow_partial)?;
        Ok(result)
    }

    /// Source `usd` from strategies: those holding `withdraw_token` first,
    /// then the rest, each group proportionally to strategy value.
    pub(crate) fn take_from_strategies(&mut self, withdraw_token: Address, usd: U256, allow_partial: bool) -> RouterResult<Payout> {
        let values = self.state.strategies_value(self.oracle)?;
        let mut matching = Vec::new();
        let mut others = Vec::new();
        for (id, value) in values.values {
            let token = self.state.strategies.get(id)?.token;
            if token == withdraw_token {
                matching.push((id, token, value));
            } else {
                others.push((id, token, value));
            }
        }

        let mut result = Payout::default();
        for group in [matching, others] {
            let remaining = usd - result.covered_usd;
            if remaining.is_zero() {
                break;
            }
            let group_value = group.iter().fold(U256::ZERO, |acc, (_, _, value)| acc + *value);
            if group_value.is_zero() {
                continue;
            }
            let take = remaining.min(group_value);
            let paid = self.withdraw_group(&group, group_value, take, withdraw_token)?;
            result.payout += paid;
            result.covered_usd += take;
        }

        self.check_shortfall(usd - result.covered_usd, allow_partial)?;
        Ok(result)
    }

    /// Source a shareholder claim of `usd`: strategies first, then the batch
    /// value shareholders own.
    fn take_from_holdings(&mut self, withdraw_token: Address, usd: U256) -> RouterResult<U256> {
        let from_strategies = self.take_from_strategies(withdraw_token, usd, true)?;
        let mut payout = from_strategies.payout;
        let mut missing = usd - from_strategies.covered_usd;

        let holder_usd = self.state.current_cycle_info()?.holder_batch_usd;
        let from_batch = missing.min(holder_usd);
        if !from_batch.is_zero() {
            let taken = self.take_from_batch(withdraw_token, from_batch, true)?;
            payout += taken.payout;
            missing -= taken.covered_usd;
            self.state.current_cycle_mut()?.holder_batch_usd = holder_usd.saturating_sub(taken.covered_usd);
        }
        self.check_shortfall(missing, false)?;
        Ok(payout)
    }

    /// Fail when the batch value that belongs to depositors cannot cover `usd`.
    fn ensure_depositor_liquidity(&self, usd: U256) -> RouterResult<()> {
        let available = self.state.depositor_batch_usd(self.oracle)?;
        self.check_shortfall(usd.saturating_sub(available), false)
    }

    /// Rounding leaves shortfalls of a few wei; anything below the dust
    /// threshold is accepted.
    fn check_shortfall(&self, missing_usd: U256, allow_partial: bool) -> RouterResult<()> {
        if allow_partial || missing_usd.is_zero() || missing_usd < self.state.config.rebalance_swap_threshold {
            return Ok(());
        }
        Err(RouterError::InsufficientLiquidity { missing_usd })
    }

    fn withdraw_group(
        &mut self,
        group: &[(StrategyId, Address, U256)],
        group_value: U256,
        take: U256,
        withdraw_token: Address,
    ) -> RouterResult<U256> {
        let mut payout = U256::ZERO;
        let mut assigned = U256::ZERO;
        for (i, (id, token, value)) in group.iter().enumerate() {
            let part = if i + 1 == group.len() { take - assigned } else { mul_div(take, *value, group_value)? };
            let part = part.min(*value);
            assigned += part;
            if part.is_zero() {
                continue;
            }

            let held = self.state.strategies.get(*id)?.strategy.total_tokens();
            let amount = if part == *value { held } else { self.amount_for_usd(*token, part)?.min(held) };
            let withdrawn = self.state.strategies.get_mut(*id)?.strategy.withdraw(amount)?;
            payout += self.swap(*token, withdraw_token, withdrawn)?;
        }
        Ok(payout)
    }

    pub(crate) fn withdraw_from_batching(
        &mut self,
        caller: Address,
        receipt_ids: &[u64],
        withdraw_token: Address,
        amounts: &[U256],
    ) -> RouterResult<U256> {
        self.state.ensure_supported(withdraw_token)?;
        let taken = self.take_batch_receipts(caller, receipt_ids, amounts)?;

        let mut usd = U256::ZERO;
        for (token, amount) in &taken {
            usd += self.usd_value(*token, *amount)?;
        }
        self.ensure_depositor_liquidity(usd)?;

        let mut payout = U256::ZERO;
        for (token, amount) in taken {
            payout += self.pay_receipt_from_batch(token, amount, withdraw_token)?;
        }

        debug!(%caller, ?receipt_ids, %withdraw_token, %payout, "withdrawn from batching");
        self.emit(RouterEvent::WithdrawFromBatching {
            caller,
            receipt_ids: receipt_ids.to_vec(),
            token: withdraw_token,
            payout,
        });
        Ok(payout)
    }

    pub(crate) fn withdraw_from_strategies(
        &mut self,
        caller: Address,
        receipt_ids: &[u64],
        withdraw_token: Address,
        shares: U256,
    ) -> RouterResult<U256> {
        self.state.ensure_supported(withdraw_token)?;
        self.unlock_receipts(caller, receipt_ids, false)?;
        let shares = self.resolve_shares(caller, shares)?;

        let usd = self.state.shares_to_usd(self.oracle, shares)?;
        self.state.shares.burn(caller, shares)?;
        let payout = self.take_from_holdings(withdraw_token, usd)?;

        debug!(%caller, %shares, %usd, %withdraw_token, %payout, "withdrawn from strategies");
        self.emit(RouterEvent::WithdrawFromStrategies { caller, shares, token: withdraw_token, payout });
        Ok(payout)
    }

    /// Redeem shares out of the depositors' batch liquidity. The shares paid
    /// this way go to the router pool and are handed to the current cycle's
    /// depositors when it closes; whatever the batch cannot cover is redeemed
    /// from strategies.
    pub(crate) fn cross_withdraw_from_batching(
        &mut self,
        caller: Address,
        receipt_ids: &[u64],
        withdraw_token: Address,
        shares: U256,
    ) -> RouterResult<U256> {
        self.state.ensure_supported(withdraw_token)?;
        self.unlock_receipts(caller, receipt_ids, false)?;
        let shares = self.resolve_shares(caller, shares)?;
        let usd = self.state.shares_to_usd(self.oracle, shares)?;

        let available = self.state.depositor_batch_usd(self.oracle)?;
        let from_batch = self.take_from_batch(withdraw_token, usd.min(available), true)?;
        let shares_to_pool =
            if from_batch.covered_usd == usd { shares } else { mul_div(shares, from_batch.covered_usd, usd)? };
        if !shares_to_pool.is_zero() {
            self.state.shares.retain(caller, shares_to_pool)?;
            self.state.current_cycle_mut()?.shares_bought += shares_to_pool;
        }

        let mut payout = from_batch.payout;
        let rest = shares - shares_to_pool;
        if !rest.is_zero() {
            self.state.shares.burn(caller, rest)?;
            payout += self.take_from_holdings(withdraw_token, usd - from_batch.covered_usd)?;
        }

        debug!(%caller, %shares, %shares_to_pool, %withdraw_token, %payout, "cross withdrawn from batching");
        self.emit(RouterEvent::CrossWithdrawFromBatching { caller, shares, shares_to_pool, token: withdraw_token, payout });
        Ok(payout)
    }

    /// Redeem unprocessed batch receipts out of strategy liquidity. Pool
    /// shares bought with this cycle's batch funds are burned first, since
    /// the strategy value they stand for is what gets paid out. The batch
    /// funds left behind belong to shareholders from then on.
    pub(crate) fn cross_withdraw_from_strategies(
        &mut self,
        caller: Address,
        receipt_ids: &[u64],
        withdraw_token: Address,
        amounts: &[U256],
    ) -> RouterResult<U256> {
        self.state.ensure_supported(withdraw_token)?;
        let taken = self.take_batch_receipts(caller, receipt_ids, amounts)?;

        let mut usd = U256::ZERO;
        for (token, amount) in taken {
            usd += self.usd_value(token, amount)?;
        }

        let burned_usd = self.burn_shares_bought(usd)?;
        let from_strategies = self.take_from_strategies(withdraw_token, usd, true)?;
        let mut payout = from_strategies.payout;
        let missing = usd - from_strategies.covered_usd;
        if !missing.is_zero() {
            self.ensure_depositor_liquidity(missing)?;
            payout += self.take_from_batch(withdraw_token, missing, false)?.payout;
        }
        let left_behind = from_strategies.covered_usd.saturating_sub(burned_usd);
        self.state.current_cycle_mut()?.holder_batch_usd += left_behind;

        debug!(%caller, ?receipt_ids, %usd, %withdraw_token, %payout, "cross withdrawn from strategies");
        self.emit(RouterEvent::CrossWithdrawFromStrategies {
            caller,
            receipt_ids: receipt_ids.to_vec(),
            token: withdraw_token,
            payout,
        });
        Ok(payout)
    }

    /// Burn pool shares bought with the current cycle's batch funds, up to
    /// `usd` worth and what strategies can pay. Returns the value burned.
    fn burn_shares_bought(&mut self, usd: U256) -> RouterResult<U256> {
        let shares_bought = self.state.current_cycle_info()?.shares_bought;
        if shares_bought.is_zero() {
            return Ok(U256::ZERO);
        }
        let price_per_share = self.state.price_per_share(self.oracle)?;
        let payable = usd.min(self.state.strategies_value(self.oracle)?.total);
        let shares = shares_bought.min(mul_div(payable, PRECISION, price_per_share)?);
        let burned = self.state.shares.burn_from_pool(shares);
        self.state.current_cycle_mut()?.shares_bought = shares_bought - burned;
        debug!(%burned, "pool shares bought from the batch burned");
        Ok(mul_div(burned, price_per_share, PRECISION)?)
    }
}
