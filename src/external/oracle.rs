use super::ExternalError;
use crate::utils::{PRECISION, UNIFORM_DECIMALS, scale_decimals};
use alloy_primitives::{Address, U256};
use dashmap::DashMap;

/// USD price source. Implementations must fail rather than return a zero price.
pub trait PriceOracle: Send + Sync {
    /// Price of one whole token, expressed with `decimals` decimals.
    fn price_of(&self, token: Address) -> Result<(U256, u8), ExternalError>;

    /// Price of one whole token in uniform units (1e18 == $1).
    fn uniform_price_of(&self, token: Address) -> Result<U256, ExternalError> {
        let (price, decimals) = self.price_of(token)?;
        if price.is_zero() {
            return Err(ExternalError::PriceUnavailable(token));
        }
        Ok(scale_decimals(price, decimals, UNIFORM_DECIMALS)?)
    }
}

/// Oracle with prices set by an administrator. Used by tests and simulations.
#[derive(Debug, Default)]
pub struct FixedPriceOracle {
    prices: DashMap<Address, (U256, u8)>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, token: Address, price: U256, decimals: u8) {
        self.prices.insert(token, (price, decimals));
    }

    /// Price every listed token at exactly one dollar.
    pub fn with_unit_prices(tokens: &[Address]) -> Self {
        let oracle = Self::new();
        for token in tokens {
            oracle.set_price(*token, PRECISION, UNIFORM_DECIMALS);
        }
        oracle
    }

    pub fn remove_price(&self, token: &Address) {
        self.prices.remove(token);
    }
}

impl PriceOracle for FixedPriceOracle {
    fn price_of(&self, token: Address) -> Result<(U256, u8), ExternalError> {
        match self.prices.get(&token) {
            Some(entry) if !entry.0.is_zero() => Ok(*entry),
            _ => Err(ExternalError::PriceUnavailable(token)),
        }
    }
}
