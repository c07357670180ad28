pub mod token;
pub mod constants;
pub mod config_loader;

pub use token::{Token, scale_decimals, uniform_to_float};
pub use constants::*;
pub use config_loader::*;

use alloy_primitives::U256;
use alloy_primitives::utils::parse_units;

/// Parse a human readable decimal ("100.5") into uniform units.
pub fn parse_uniform(amount: &str) -> eyre::Result<U256> {
    parse_amount(amount, UNIFORM_DECIMALS)
}

/// Parse a human readable decimal into an amount with `decimals` places.
pub fn parse_amount(amount: &str, decimals: u8) -> eyre::Result<U256> {
    let parsed = parse_units(amount, decimals).map_err(|e| eyre::eyre!("invalid amount {amount:?}: {e}"))?;
    Ok(parsed.get_absolute())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// `a * b / c`, returning zero when `c` is zero.
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256, MathError> {
    if c.is_zero() {
        return Ok(U256::ZERO);
    }
    a.checked_mul(b).map(|product| product / c).ok_or(MathError::Overflow("mul_div"))
}

/// USD value, in uniform units, of `amount` of `token` at `uniform_price`.
pub fn to_usd(token: &Token, amount: U256, uniform_price: U256) -> Result<U256, MathError> {
    mul_div(token.to_uniform(amount)?, uniform_price, PRECISION)
}

/// Native amount of `token` worth `usd` at `uniform_price`, rounded down.
pub fn from_usd(token: &Token, usd: U256, uniform_price: U256) -> Result<U256, MathError> {
    token.from_uniform(mul_div(usd, PRECISION, uniform_price)?)
}

/// `value * bps / 10_000`.
pub fn apply_bps(value: U256, bps: u64) -> Result<U256, MathError> {
    mul_div(value, U256::from(bps), U256::from(BPS_DENOMINATOR))
}
