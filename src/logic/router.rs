use super::state::{RouterContext, RouterState};
use super::types::{BatchRebalance, BatchValue, CycleInfo, CycleSettlement, RouterEvent, StrategiesValue, StrategyInfo};
use crate::config::{DeploymentConfig, RouterConfig};
use crate::error::{RouterError, RouterResult};
use crate::external::{Exchange, FixedPriceOracle, OracleExchange, PriceOracle};
use crate::ledgers::Receipt;
use crate::strategies::{Strategy, StrategyEntry, StrategyId};
use crate::utils::{Token, UNIFORM_DECIMALS};
use alloy_primitives::{Address, U256};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// StrategyRouter is the accounting engine of the protocol
///
/// It owns the batch, the receipt and share ledgers and the strategy
/// registry, and routes every deposit and withdrawal between them:
/// 1. Deposits land in the batch and mint a receipt
/// 2. `deposit_to_strategies` closes the cycle, deploys the batch and prices its receipts
/// 3. Withdrawals are paid from the batch, from strategies, or across the two
///
/// Every mutating call runs under one lock against a working copy of the
/// state that is committed only when the call succeeds.
pub struct StrategyRouter {
    oracle: Arc<dyn PriceOracle>,
    exchange: Arc<dyn Exchange>,
    state: Mutex<RouterState>,
}

impl StrategyRouter {
    fn transact<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut RouterContext<'_>) -> RouterResult<T>,
    ) -> RouterResult<T> {
        let mut guard = self.state.lock();
        let mut working = guard.clone();
        let result = f(&mut RouterContext { state: &mut working, oracle: self.oracle.as_ref(), exchange: self.exchange.as_ref() });
        match result {
            Ok(value) => {
                *guard = working;
                Ok(value)
            }
            Err(e) => {
                warn!(operation, error = %e, "operation reverted");
                Err(e)
            }
        }
    }

    fn view<T>(&self, f: impl FnOnce(&RouterState, &dyn PriceOracle) -> RouterResult<T>) -> RouterResult<T> {
        let guard = self.state.lock();
        f(&guard, self.oracle.as_ref())
    }

    // ---- deposits and cycles ----

    /// Put `amount` of `token` into the batch. Returns the new receipt id.
    pub fn deposit_to_batch(&self, caller: Address, token: Address, amount: U256) -> RouterResult<u64> {
        self.transact("deposit_to_batch", |ctx| ctx.deposit_to_batch(caller, token, amount))
    }

    /// Close the current cycle. Callable by anyone once the cycle duration has passed.
    pub fn deposit_to_strategies(&self, caller: Address) -> RouterResult<CycleSettlement> {
        info!(%caller, "depositing batch to strategies");
        self.transact("deposit_to_strategies", |ctx| ctx.deposit_to_strategies())
    }

    /// Convert the caller's own processed receipts into shares.
    pub fn unlock_shares(&self, caller: Address, receipt_ids: &[u64]) -> RouterResult<U256> {
        self.transact("unlock_shares", |ctx| ctx.unlock_receipts(caller, receipt_ids, false))
    }

    /// Convert processed receipts into shares for their owners. Whitelisted
    /// unlockers may pass receipts of other owners.
    pub fn unlock_shares_from_receipts(&self, caller: Address, receipt_ids: &[u64]) -> RouterResult<U256> {
        self.transact("unlock_shares_from_receipts", |ctx| ctx.unlock_receipts(caller, receipt_ids, true))
    }

    // ---- withdrawals ----

    /// Redeem unprocessed receipts from the batch. `MAX_AMOUNT` takes the whole receipt.
    pub fn withdraw_from_batching(
        &self,
        caller: Address,
        receipt_ids: &[u64],
        withdraw_token: Address,
        amounts: &[U256],
    ) -> RouterResult<U256> {
        self.transact("withdraw_from_batching", |ctx| ctx.withdraw_from_batching(caller, receipt_ids, withdraw_token, amounts))
    }

    /// Unlock `receipt_ids`, then redeem `shares` (`MAX_AMOUNT` = all) from strategies.
    pub fn withdraw_from_strategies(
        &self,
        caller: Address,
        receipt_ids: &[u64],
        withdraw_token: Address,
        shares: U256,
    ) -> RouterResult<U256> {
        self.transact("withdraw_from_strategies", |ctx| ctx.withdraw_from_strategies(caller, receipt_ids, withdraw_token, shares))
    }

    pub fn cross_withdraw_from_batching(
        &self,
        caller: Address,
        receipt_ids: &[u64],
        withdraw_token: Address,
        shares: U256,
    ) -> RouterResult<U256> {
        self.transact("cross_withdraw_from_batching", |ctx| {
            ctx.cross_withdraw_from_batching(caller, receipt_ids, withdraw_token, shares)
        })
    }

    pub fn cross_withdraw_from_strategies(
        &self,
        caller: Address,
        receipt_ids: &[u64],
        withdraw_token: Address,
        amounts: &[U256],
    ) -> RouterResult<U256> {
        self.transact("cross_withdraw_from_strategies", |ctx| {
            ctx.cross_withdraw_from_strategies(caller, receipt_ids, withdraw_token, amounts)
        })
    }

    pub fn withdraw_shares(&self, caller: Address, shares: U256, withdraw_token: Address) -> RouterResult<U256> {
        self.transact("withdraw_shares", |ctx| ctx.withdraw_from_strategies(caller, &[], withdraw_token, shares))
    }

    pub fn cross_withdraw_shares(&self, caller: Address, shares: U256, withdraw_token: Address) -> RouterResult<U256> {
        self.transact("cross_withdraw_shares", |ctx| ctx.cross_withdraw_from_batching(caller, &[], withdraw_token, shares))
    }

    /// Batch part then strategy part, in one atomic call. Either part is
    /// skipped when it has nothing to do.
    ///
    /// `shares` is the total redeemed from strategies, counting the shares
    /// `share_receipt_ids` unlock. It is not added on top of them, so passing
    /// receipts with `shares` of zero is rejected; use `MAX_AMOUNT` to redeem
    /// everything unlocked.
    pub fn withdraw_universal(
        &self,
        caller: Address,
        batch_receipt_ids: &[u64],
        share_receipt_ids: &[u64],
        withdraw_token: Address,
        batch_amounts: &[U256],
        shares: U256,
    ) -> RouterResult<U256> {
        self.transact("withdraw_universal", |ctx| {
            let mut payout = U256::ZERO;
            if !batch_receipt_ids.is_empty() || !batch_amounts.is_empty() {
                payout += ctx.withdraw_from_batching(caller, batch_receipt_ids, withdraw_token, batch_amounts)?;
            }
            if !share_receipt_ids.is_empty() || !shares.is_zero() {
                payout += ctx.withdraw_from_strategies(caller, share_receipt_ids, withdraw_token, shares)?;
            }
            Ok(payout)
        })
    }

    pub fn transfer_shares(&self, caller: Address, to: Address, shares: U256) -> RouterResult<()> {
        self.transact("transfer_shares", |ctx| {
            ctx.state.shares.transfer(caller, to, shares)?;
            ctx.emit(RouterEvent::SharesTransferred { from: caller, to, shares });
            Ok(())
        })
    }

    pub fn transfer_receipt(&self, caller: Address, receipt_id: u64, to: Address) -> RouterResult<()> {
        self.transact("transfer_receipt", |ctx| {
            ctx.state.receipts.transfer(receipt_id, caller, to)?;
            ctx.emit(RouterEvent::ReceiptTransferred { receipt_id, from: caller, to });
            Ok(())
        })
    }

    // ---- administration ----

    pub fn rebalance_batching(&self, caller: Address) -> RouterResult<BatchRebalance> {
        self.transact("rebalance_batching", |ctx| {
            ctx.state.ensure_owner(caller)?;
            let report = ctx.rebalance_batch()?;
            info!(total = %report.total_before, "batch rebalanced");
            ctx.emit(RouterEvent::BatchRebalanced { total_usd: report.total_before, swaps: report.swaps });
            Ok(report)
        })
    }

    pub fn rebalance_strategies(&self, caller: Address) -> RouterResult<StrategiesValue> {
        self.transact("rebalance_strategies", |ctx| {
            ctx.state.ensure_owner(caller)?;
            ctx.rebalance_strategies()
        })
    }

    pub fn add_strategy(
        &self,
        caller: Address,
        strategy: Box<dyn Strategy>,
        token: Address,
        weight: u64,
    ) -> RouterResult<StrategyId> {
        self.transact("add_strategy", |ctx| {
            ctx.state.ensure_owner(caller)?;
            ctx.add_strategy(strategy, token, weight)
        })
    }

    /// Remove the active strategy at `index`. The last active strategy moves
    /// into `index`, so positions are not stable across removals.
    pub fn remove_strategy(&self, caller: Address, index: usize) -> RouterResult<StrategyId> {
        self.transact("remove_strategy", |ctx| {
            ctx.state.ensure_owner(caller)?;
            ctx.remove_strategy(index)
        })
    }

    pub fn set_supported_token(&self, caller: Address, token: Token, supported: bool) -> RouterResult<()> {
        self.transact("set_supported_token", |ctx| {
            ctx.state.ensure_owner(caller)?;
            let address = token.get_address();
            if supported {
                ctx.state.tokens.insert(address, token);
                ctx.state.supported.insert(address);
            } else {
                if ctx.state.strategies.uses_token(address) || !ctx.state.batch.balance(address).is_zero() {
                    return Err(RouterError::TokenInUse(address));
                }
                ctx.state.supported.remove(&address);
            }
            info!(token = %address, supported, "supported token changed");
            ctx.emit(RouterEvent::SupportedTokenChanged { token: address, supported });
            Ok(())
        })
    }

    pub fn set_unlocker(&self, caller: Address, unlocker: Address, allowed: bool) -> RouterResult<()> {
        self.transact("set_unlocker", |ctx| {
            ctx.state.ensure_owner(caller)?;
            if allowed {
                ctx.state.unlockers.insert(unlocker);
            } else {
                ctx.state.unlockers.remove(&unlocker);
            }
            ctx.emit(RouterEvent::UnlockerChanged { unlocker, allowed });
            Ok(())
        })
    }

    pub fn update_config(&self, caller: Address, config: RouterConfig) -> RouterResult<()> {
        self.transact("update_config", |ctx| {
            ctx.state.ensure_owner(caller)?;
            config.validate()?;
            ctx.state.config = config;
            info!("router config updated");
            ctx.emit(RouterEvent::ConfigUpdated);
            Ok(())
        })
    }

    /// Compound every strategy now, charging the performance fee. Returns the
    /// realized yield and the fee shares minted.
    pub fn compound_all(&self, caller: Address) -> RouterResult<(U256, U256)> {
        self.transact("compound_all", |ctx| {
            ctx.state.ensure_owner(caller)?;
            ctx.compound_and_charge_fee()
        })
    }

    // ---- time ----

    pub fn block_timestamp(&self) -> u64 {
        self.state.lock().timestamp
    }

    pub fn set_block_timestamp(&self, timestamp: u64) {
        self.state.lock().timestamp = timestamp;
    }

    pub fn advance_time(&self, secs: u64) {
        let mut state = self.state.lock();
        state.timestamp = state.timestamp.saturating_add(secs);
    }

    // ---- views ----

    pub fn receipts_to_shares(&self, receipt_ids: &[u64]) -> RouterResult<U256> {
        self.view(|state, _| {
            receipt_ids
                .iter()
                .try_fold(U256::ZERO, |acc, id| -> RouterResult<U256> { Ok(acc + state.receipt_shares(state.receipts.get(*id)?)?) })
        })
    }

    pub fn shares_to_usd(&self, shares: U256) -> RouterResult<U256> {
        self.view(|state, oracle| state.shares_to_usd(oracle, shares))
    }

    pub fn get_strategies_value(&self) -> RouterResult<StrategiesValue> {
        self.view(|state, oracle| state.strategies_value(oracle))
    }

    pub fn get_batch_value(&self) -> RouterResult<BatchValue> {
        self.view(|state, oracle| state.batch_value(oracle))
    }

    pub fn price_per_share(&self) -> RouterResult<U256> {
        self.view(|state, oracle| state.price_per_share(oracle))
    }

    pub fn get_receipt(&self, receipt_id: u64) -> RouterResult<Receipt> {
        self.view(|state, _| state.receipts.get(receipt_id).cloned())
    }

    pub fn receipts_of(&self, owner: Address) -> Vec<u64> {
        self.state.lock().receipts.receipts_of(owner)
    }

    pub fn shares_balance_of(&self, holder: Address) -> U256 {
        self.state.lock().shares.balance_of(holder)
    }

    pub fn total_shares(&self) -> U256 {
        self.state.lock().shares.total_supply()
    }

    /// Shares minted by closed cycles and not yet unlocked.
    pub fn router_pool_shares(&self) -> U256 {
        self.state.lock().shares.pool()
    }

    pub fn current_cycle(&self) -> u64 {
        self.state.lock().current_cycle
    }

    pub fn cycle_info(&self, cycle_id: u64) -> Option<CycleInfo> {
        self.state.lock().cycles.get(&cycle_id).cloned()
    }

    /// Active strategies in index order.
    pub fn view_strategies(&self) -> Vec<StrategyInfo> {
        self.state.lock().strategies.active_entries().map(strategy_info).collect()
    }

    /// Any strategy ever registered, including removed ones.
    pub fn strategy_info(&self, id: StrategyId) -> RouterResult<StrategyInfo> {
        self.view(|state, _| state.strategies.get(id).map(strategy_info))
    }

    pub fn supported_tokens(&self) -> Vec<Token> {
        let state = self.state.lock();
        state.supported.iter().filter_map(|address| state.tokens.get(address).cloned()).collect()
    }

    pub fn is_unlocker(&self, address: Address) -> bool {
        self.state.lock().unlockers.contains(&address)
    }

    pub fn config(&self) -> RouterConfig {
        self.state.lock().config.clone()
    }

    pub fn take_events(&self) -> Vec<RouterEvent> {
        std::mem::take(&mut self.state.lock().events)
    }
}

fn strategy_info(entry: &StrategyEntry) -> StrategyInfo {
    StrategyInfo {
        id: entry.id,
        address: entry.address(),
        token: entry.token,
        weight: entry.weight,
        state: entry.state,
        tokens: entry.strategy.total_tokens(),
    }
}

/// Builder pattern for creating and configuring a StrategyRouter
pub struct StrategyRouterBuilder {
    config: RouterConfig,
    oracle: Option<Arc<dyn PriceOracle>>,
    exchange: Option<Arc<dyn Exchange>>,
    tokens: Vec<Token>,
    strategies: Vec<(Box<dyn Strategy>, u64)>,
    unlockers: Vec<Address>,
    timestamp: u64,
}

impl StrategyRouterBuilder {
    pub fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            oracle: None,
            exchange: None,
            tokens: Vec::new(),
            strategies: Vec::new(),
            unlockers: Vec::new(),
            timestamp: 0,
        }
    }

    /// Builder for a deployment file. Tokens with a `price` are served by a
    /// fixed-price oracle and converted by an oracle-priced exchange.
    pub fn from_deployment(deployment: DeploymentConfig) -> RouterResult<Self> {
        let oracle = Arc::new(FixedPriceOracle::new());
        let mut tokens = Vec::with_capacity(deployment.tokens.len());
        for token_config in &deployment.tokens {
            if let Some(price) = token_config.uniform_price()? {
                oracle.set_price(token_config.address, price, UNIFORM_DECIMALS);
            }
            tokens.push(token_config.to_token());
        }
        let exchange = Arc::new(OracleExchange::with_tokens(oracle.clone(), deployment.exchange_fee_bps, &tokens));

        let mut builder = Self::new().with_config(deployment.router).with_oracle(oracle).with_exchange(exchange);
        for token in tokens {
            builder = builder.with_token(token);
        }
        for entry in deployment.strategies {
            builder = builder.with_strategy(entry.strategy, entry.weight);
        }
        Ok(builder)
    }

    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Without an exchange the router converts at oracle prices with no fee.
    pub fn with_exchange(mut self, exchange: Arc<dyn Exchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.tokens.push(token);
        self
    }

    /// Register a strategy on its own deposit token.
    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>, weight: u64) -> Self {
        self.strategies.push((strategy, weight));
        self
    }

    pub fn with_unlocker(mut self, unlocker: Address) -> Self {
        self.unlockers.push(unlocker);
        self
    }

    pub fn with_block_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn build(self) -> RouterResult<StrategyRouter> {
        self.config.validate()?;
        let oracle = self
            .oracle
            .ok_or(RouterError::InvalidParameter { name: "oracle", reason: "no price oracle configured".to_string() })?;
        let exchange: Arc<dyn Exchange> = match self.exchange {
            Some(exchange) => exchange,
            None => Arc::new(OracleExchange::with_tokens(oracle.clone(), 0, &self.tokens)),
        };

        let mut state = RouterState::new(self.config, self.timestamp);
        for token in self.tokens {
            state.supported.insert(token.get_address());
            state.tokens.insert(token.get_address(), token);
        }
        for (strategy, weight) in self.strategies {
            let token = strategy.deposit_token();
            state.ensure_supported(token)?;
            state.strategies.add(strategy, token, weight)?;
        }
        state.unlockers.extend(self.unlockers);

        info!(
            tokens = state.supported.len(),
            strategies = state.strategies.len(),
            owner = %state.config.owner,
            "strategy router initialized"
        );
        Ok(StrategyRouter { oracle, exchange, state: Mutex::new(state) })
    }
}

impl Default for StrategyRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
