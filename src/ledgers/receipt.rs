use crate::error::{RouterError, RouterResult};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record of a single batch deposit. `amount` is what remains redeemable, in
/// the token's native decimals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: u64,
    pub owner: Address,
    pub token: Address,
    pub amount: U256,
    pub initial_amount: U256,
    pub cycle_id: u64,
    pub consumed: bool,
}

/// Non-fungible deposit receipts. Ids start at 1 and are never reused; a
/// consumed receipt stays in the ledger but is no longer visible through
/// [`ReceiptLedger::get`].
#[derive(Clone, Debug, Default)]
pub struct ReceiptLedger {
    last_id: u64,
    receipts: BTreeMap<u64, Receipt>,
}

impl ReceiptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, owner: Address, token: Address, amount: U256, cycle_id: u64) -> u64 {
        self.last_id += 1;
        let id = self.last_id;
        self.receipts.insert(id, Receipt { id, owner, token, amount, initial_amount: amount, cycle_id, consumed: false });
        id
    }

    pub fn get(&self, id: u64) -> RouterResult<&Receipt> {
        match self.receipts.get(&id) {
            Some(receipt) if !receipt.consumed => Ok(receipt),
            _ => Err(RouterError::ReceiptNotFound(id)),
        }
    }

    /// Subtract `amount` from the receipt and burn it once nothing is left.
    /// Returns the amount actually taken.
    pub fn reduce(&mut self, id: u64, amount: U256) -> RouterResult<U256> {
        let receipt = match self.receipts.get_mut(&id) {
            Some(receipt) if !receipt.consumed => receipt,
            _ => return Err(RouterError::ReceiptNotFound(id)),
        };
        if amount > receipt.amount {
            return Err(RouterError::InsufficientBalance { requested: amount, available: receipt.amount });
        }
        receipt.amount -= amount;
        if receipt.amount.is_zero() {
            receipt.consumed = true;
        }
        Ok(amount)
    }

    pub fn burn(&mut self, id: u64) -> RouterResult<Receipt> {
        match self.receipts.get_mut(&id) {
            Some(receipt) if !receipt.consumed => {
                receipt.consumed = true;
                Ok(receipt.clone())
            }
            _ => Err(RouterError::ReceiptNotFound(id)),
        }
    }

    pub fn transfer(&mut self, id: u64, from: Address, to: Address) -> RouterResult<()> {
        let receipt = match self.receipts.get_mut(&id) {
            Some(receipt) if !receipt.consumed => receipt,
            _ => return Err(RouterError::ReceiptNotFound(id)),
        };
        if receipt.owner != from {
            return Err(RouterError::Unauthorized { caller: from, reason: "not the receipt owner" });
        }
        receipt.owner = to;
        Ok(())
    }

    /// Live receipt ids of `owner`, ascending.
    pub fn receipts_of(&self, owner: Address) -> Vec<u64> {
        self.receipts.values().filter(|r| !r.consumed && r.owner == owner).map(|r| r.id).collect()
    }

    pub fn pending_for_cycle(&self, cycle_id: u64) -> impl Iterator<Item = &Receipt> {
        self.receipts.values().filter(move |r| !r.consumed && r.cycle_id == cycle_id)
    }
}
