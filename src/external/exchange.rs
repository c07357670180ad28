use super::{ExternalError, PriceOracle};
use crate::utils::{PRECISION, Token, apply_bps, mul_div, BPS_DENOMINATOR};
use alloy_primitives::{Address, U256};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Token-to-token conversion venue.
pub trait Exchange: Send + Sync {
    /// Quote without executing.
    fn estimate_swap(&self, from: Address, to: Address, amount: U256) -> Result<U256, ExternalError>;

    /// Execute a swap of `amount` of `from` and return the amount of `to` received.
    fn swap(&self, from: Address, to: Address, amount: U256) -> Result<U256, ExternalError>;
}

/// Exchange that converts at oracle prices minus a flat fee, with unlimited
/// liquidity. Counts executed swaps so callers can assert on routing.
pub struct OracleExchange {
    oracle: Arc<dyn PriceOracle>,
    tokens: DashMap<Address, Token>,
    fee_bps: u64,
    swaps: AtomicU64,
}

impl OracleExchange {
    pub fn new(oracle: Arc<dyn PriceOracle>, fee_bps: u64) -> Self {
        Self { oracle, tokens: DashMap::new(), fee_bps: fee_bps.min(BPS_DENOMINATOR), swaps: AtomicU64::new(0) }
    }

    pub fn with_tokens(oracle: Arc<dyn PriceOracle>, fee_bps: u64, tokens: &[Token]) -> Self {
        let exchange = Self::new(oracle, fee_bps);
        for token in tokens {
            exchange.add_token(token.clone());
        }
        exchange
    }

    pub fn add_token(&self, token: Token) {
        self.tokens.insert(token.get_address(), token);
    }

    pub fn swaps_executed(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    fn token(&self, address: Address) -> Result<Token, ExternalError> {
        self.tokens.get(&address).map(|t| t.clone()).ok_or(ExternalError::UnknownToken(address))
    }
}

impl Exchange for OracleExchange {
    fn estimate_swap(&self, from: Address, to: Address, amount: U256) -> Result<U256, ExternalError> {
        let token_in = self.token(from)?;
        let token_out = self.token(to)?;
        let price_in = self.oracle.uniform_price_of(from)?;
        let price_out = self.oracle.uniform_price_of(to)?;

        let usd_in = mul_div(token_in.to_uniform(amount)?, price_in, PRECISION)?;
        let usd_out = usd_in - apply_bps(usd_in, self.fee_bps)?;
        Ok(token_out.from_uniform(mul_div(usd_out, PRECISION, price_out)?)?)
    }

    fn swap(&self, from: Address, to: Address, amount: U256) -> Result<U256, ExternalError> {
        if from == to {
            return Err(ExternalError::SwapFailed { from, to, reason: "identical tokens".to_string() });
        }
        let amount_out = self.estimate_swap(from, to, amount)?;
        self.swaps.fetch_add(1, Ordering::Relaxed);
        debug!(%from, %to, %amount, %amount_out, "swap executed");
        Ok(amount_out)
    }
}
