use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;

/// One planned conversion: move `usd` worth of `from` into `to`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapLeg {
    pub from: Address,
    pub to: Address,
    pub usd: U256,
}

/// Pair surplus tokens with deficit tokens, largest first, until every
/// difference is matched. Tokens missing from `targets` target zero. Legs worth
/// less than `threshold` are dropped; the unmatched dust stays where it is.
pub fn plan_swap_legs(values: &BTreeMap<Address, U256>, targets: &BTreeMap<Address, U256>, threshold: U256) -> Vec<SwapLeg> {
    let mut excess: Vec<(Address, U256)> = Vec::new();
    let mut deficit: Vec<(Address, U256)> = Vec::new();

    for (token, value) in values {
        let target = targets.get(token).copied().unwrap_or_default();
        if *value > target {
            excess.push((*token, *value - target));
        }
    }
    for (token, target) in targets {
        let value = values.get(token).copied().unwrap_or_default();
        if *target > value {
            deficit.push((*token, *target - value));
        }
    }

    excess.sort_by(|a, b| b.1.cmp(&a.1));
    deficit.sort_by(|a, b| b.1.cmp(&a.1));

    let mut legs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < excess.len() && j < deficit.len() {
        let usd = excess[i].1.min(deficit[j].1);
        if !usd.is_zero() && usd >= threshold {
            legs.push(SwapLeg { from: excess[i].0, to: deficit[j].0, usd });
        }
        excess[i].1 -= usd;
        deficit[j].1 -= usd;
        if excess[i].1.is_zero() {
            i += 1;
        }
        if deficit[j].1.is_zero() {
            j += 1;
        }
    }
    legs
}
