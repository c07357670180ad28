/// Claim ledgers
///
/// Receipts are the non-fungible claim on a not-yet-deployed batch deposit,
/// shares the fungible claim on deployed strategy value.

pub mod receipt;
pub mod shares;

pub use receipt::{Receipt, ReceiptLedger};
pub use shares::ShareLedger;
