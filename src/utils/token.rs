use super::MathError;
use super::constants::{PRECISION, UNIFORM_DECIMALS};
use alloy_primitives::utils::Unit;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::default::Default;
use std::hash::{Hash, Hasher};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Token {
    address: Address,
    decimals: u8,
    name: Option<String>,
    symbol: Option<String>,
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state)
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.get_address()
    }
}

impl Eq for Token {}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address.cmp(&other.get_address())
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Token {
    pub fn new(address: Address) -> Token {
        Token { address, decimals: 18, ..Token::default() }
    }

    pub fn new_with_data(address: Address, symbol: Option<String>, name: Option<String>, decimals: Option<u8>) -> Token {
        Token { address, symbol, name, decimals: decimals.unwrap_or(18) }
    }

    pub fn get_symbol(&self) -> String {
        self.symbol.clone().unwrap_or(self.address.to_string())
    }

    pub fn get_decimals(&self) -> u8 {
        self.decimals
    }

    pub fn get_exp(&self) -> U256 {
        if self.decimals == 18 { Unit::ETHER.wei() } else { U256::from(10).pow(U256::from(self.decimals)) }
    }

    pub fn get_address(&self) -> Address {
        self.address
    }

    /// Scale a native amount of this token to the 18-decimal uniform unit.
    pub fn to_uniform(&self, amount: U256) -> Result<U256, MathError> {
        scale_decimals(amount, self.decimals, UNIFORM_DECIMALS)
    }

    /// Scale a uniform amount back to this token's native decimals (rounds down).
    pub fn from_uniform(&self, amount: U256) -> Result<U256, MathError> {
        scale_decimals(amount, UNIFORM_DECIMALS, self.decimals)
    }

    pub fn to_float(&self, value: U256) -> f64 {
        if self.decimals == 0 {
            0f64
        } else {
            let divider = self.get_exp();
            let ret = value.div_rem(divider);

            let div = u64::try_from(ret.0);
            let rem = u64::try_from(ret.1);

            if div.is_err() || rem.is_err() {
                0f64
            } else {
                div.unwrap_or_default() as f64 + ((rem.unwrap_or_default() as f64) / (10u64.pow(self.decimals as u32) as f64))
            }
        }
    }
}

/// Convert an amount between two decimal precisions.
pub fn scale_decimals(amount: U256, from: u8, to: u8) -> Result<U256, MathError> {
    let factor = |diff: u8| U256::from(10).checked_pow(U256::from(diff)).ok_or(MathError::Overflow("scale_decimals"));
    match from.cmp(&to) {
        Ordering::Equal => Ok(amount),
        Ordering::Less => amount.checked_mul(factor(to - from)?).ok_or(MathError::Overflow("scale_decimals")),
        Ordering::Greater => Ok(amount / factor(from - to)?),
    }
}

/// Render a uniform amount as a float, for logging only.
pub fn uniform_to_float(value: U256) -> f64 {
    let (div, rem) = value.div_rem(PRECISION);
    match (u64::try_from(div), u64::try_from(rem)) {
        (Ok(div), Ok(rem)) => div as f64 + rem as f64 / 1e18,
        _ => f64::MAX,
    }
}
