use super::types::{BatchValue, CycleInfo, RouterEvent, StrategiesValue};
use crate::batching::BatchPool;
use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};
use crate::external::{Exchange, ExternalError, PriceOracle};
use crate::ledgers::{Receipt, ReceiptLedger, ShareLedger};
use crate::strategies::StrategyRegistry;
use crate::utils::{INITIAL_SHARES_PER_UNIT, PRECISION, Token, from_usd, mul_div, to_usd};
use alloy_primitives::{Address, U256};
use std::collections::{BTreeMap, BTreeSet};

/// Everything the router mutates. Cloned into a working copy for every entry
/// point and written back only when the operation succeeds.
#[derive(Clone, Debug)]
pub(crate) struct RouterState {
    pub config: RouterConfig,
    /// Every token ever supported; decimals stay resolvable after a token is disabled
    pub tokens: BTreeMap<Address, Token>,
    pub supported: BTreeSet<Address>,
    pub batch: BatchPool,
    pub receipts: ReceiptLedger,
    pub shares: ShareLedger,
    pub strategies: StrategyRegistry,
    pub cycles: BTreeMap<u64, CycleInfo>,
    pub current_cycle: u64,
    pub timestamp: u64,
    pub unlockers: BTreeSet<Address>,
    pub events: Vec<RouterEvent>,
}

impl RouterState {
    pub fn new(config: RouterConfig, timestamp: u64) -> Self {
        let mut cycles = BTreeMap::new();
        cycles.insert(0, CycleInfo::open(0, timestamp));
        Self {
            config,
            tokens: BTreeMap::new(),
            supported: BTreeSet::new(),
            batch: BatchPool::new(),
            receipts: ReceiptLedger::new(),
            shares: ShareLedger::new(),
            strategies: StrategyRegistry::new(),
            cycles,
            current_cycle: 0,
            timestamp,
            unlockers: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    pub fn ensure_owner(&self, caller: Address) -> RouterResult<()> {
        if caller != self.config.owner {
            return Err(RouterError::Unauthorized { caller, reason: "owner only" });
        }
        Ok(())
    }

    pub fn ensure_supported(&self, token: Address) -> RouterResult<()> {
        if !self.supported.contains(&token) {
            return Err(RouterError::UnsupportedToken(token));
        }
        Ok(())
    }

    pub fn token(&self, token: Address) -> RouterResult<&Token> {
        self.tokens.get(&token).ok_or(RouterError::UnsupportedToken(token))
    }

    pub fn current_cycle_info(&self) -> RouterResult<&CycleInfo> {
        self.cycles
            .get(&self.current_cycle)
            .ok_or(RouterError::InvalidParameter { name: "cycle", reason: format!("cycle {} missing", self.current_cycle) })
    }

    pub fn current_cycle_mut(&mut self) -> RouterResult<&mut CycleInfo> {
        let id = self.current_cycle;
        self.cycles
            .get_mut(&id)
            .ok_or(RouterError::InvalidParameter { name: "cycle", reason: format!("cycle {id} missing") })
    }

    pub fn usd_value(&self, oracle: &dyn PriceOracle, token: Address, amount: U256) -> RouterResult<U256> {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        let price = oracle.uniform_price_of(token)?;
        Ok(to_usd(self.token(token)?, amount, price)?)
    }

    pub fn amount_for_usd(&self, oracle: &dyn PriceOracle, token: Address, usd: U256) -> RouterResult<U256> {
        if usd.is_zero() {
            return Ok(U256::ZERO);
        }
        let price = oracle.uniform_price_of(token)?;
        Ok(from_usd(self.token(token)?, usd, price)?)
    }

    pub fn batch_value(&self, oracle: &dyn PriceOracle) -> RouterResult<BatchValue> {
        let mut value = BatchValue::default();
        for (token, amount) in self.batch.balances() {
            let usd = self.usd_value(oracle, token, amount)?;
            value.total += usd;
            value.balances.push((token, amount, usd));
        }
        Ok(value)
    }

    pub fn strategies_value(&self, oracle: &dyn PriceOracle) -> RouterResult<StrategiesValue> {
        let mut value = StrategiesValue::default();
        for entry in self.strategies.active_entries() {
            let usd = self.usd_value(oracle, entry.token, entry.strategy.total_tokens())?;
            value.total += usd;
            value.values.push((entry.id, usd));
        }
        Ok(value)
    }

    /// Value standing behind the share supply: deployed funds plus the batch
    /// value shareholders own in the current cycle.
    pub fn holders_value(&self, oracle: &dyn PriceOracle) -> RouterResult<U256> {
        Ok(self.strategies_value(oracle)?.total + self.current_cycle_info()?.holder_batch_usd)
    }

    /// Current uniform USD per share (1e18 scaled). Falls back to the initial
    /// price while no shares exist.
    pub fn price_per_share(&self, oracle: &dyn PriceOracle) -> RouterResult<U256> {
        let supply = self.shares.total_supply();
        if supply.is_zero() {
            return Ok(PRECISION / INITIAL_SHARES_PER_UNIT);
        }
        Ok(mul_div(self.holders_value(oracle)?, PRECISION, supply)?)
    }

    pub fn shares_to_usd(&self, oracle: &dyn PriceOracle, shares: U256) -> RouterResult<U256> {
        Ok(mul_div(shares, self.holders_value(oracle)?, self.shares.total_supply())?)
    }

    /// Batch value that belongs to the current cycle's depositors.
    pub fn depositor_batch_usd(&self, oracle: &dyn PriceOracle) -> RouterResult<U256> {
        Ok(self.batch_value(oracle)?.total.saturating_sub(self.current_cycle_info()?.holder_batch_usd))
    }

    /// What the current cycle's receipts are owed and what backs them: their
    /// part of the batch plus the shares bought with it. Swap fees paid while
    /// rebalancing the batch leave the backing short of the claims.
    pub fn batch_backing(&self, oracle: &dyn PriceOracle) -> RouterResult<(U256, U256)> {
        let mut owed = U256::ZERO;
        for receipt in self.receipts.pending_for_cycle(self.current_cycle) {
            owed += self.usd_value(oracle, receipt.token, receipt.amount)?;
        }
        let bought = mul_div(self.current_cycle_info()?.shares_bought, self.price_per_share(oracle)?, PRECISION)?;
        Ok((owed, self.depositor_batch_usd(oracle)? + bought))
    }

    /// Share-equivalent of a processed receipt, from its cycle's settlement.
    pub fn receipt_shares(&self, receipt: &Receipt) -> RouterResult<U256> {
        if receipt.cycle_id >= self.current_cycle {
            return Err(RouterError::ReceiptNotProcessed(receipt.id));
        }
        let settlement = self
            .cycles
            .get(&receipt.cycle_id)
            .and_then(|cycle| cycle.settlement.as_ref())
            .ok_or(RouterError::ReceiptNotProcessed(receipt.id))?;
        let price = settlement.prices.get(&receipt.token).copied().ok_or(ExternalError::PriceUnavailable(receipt.token))?;

        let usd = to_usd(self.token(receipt.token)?, receipt.amount, price)?;
        let entitled = mul_div(usd, settlement.received_usd, settlement.deposited_usd)?;
        Ok(mul_div(entitled, PRECISION, settlement.price_per_share)?)
    }
}

/// Working copy of the state plus the collaborators an operation may call.
pub(crate) struct RouterContext<'a> {
    pub state: &'a mut RouterState,
    pub oracle: &'a dyn PriceOracle,
    pub exchange: &'a dyn Exchange,
}

impl RouterContext<'_> {
    pub fn usd_value(&self, token: Address, amount: U256) -> RouterResult<U256> {
        self.state.usd_value(self.oracle, token, amount)
    }

    pub fn amount_for_usd(&self, token: Address, usd: U256) -> RouterResult<U256> {
        self.state.amount_for_usd(self.oracle, token, usd)
    }

    /// Convert through the exchange; same-token and zero amounts pass through.
    pub fn swap(&self, from: Address, to: Address, amount: U256) -> RouterResult<U256> {
        if from == to || amount.is_zero() {
            return Ok(amount);
        }
        Ok(self.exchange.swap(from, to, amount)?)
    }

    pub fn emit(&mut self, event: RouterEvent) {
        self.state.events.push(event);
    }
}
