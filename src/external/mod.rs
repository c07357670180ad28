/// External collaborators
///
/// Price discovery and token conversion are owned by other systems. The router
/// only sees these traits; the concrete types here are deterministic stand-ins
/// for tests and simulations.

pub mod exchange;
pub mod oracle;

pub use exchange::{Exchange, OracleExchange};
pub use oracle::{FixedPriceOracle, PriceOracle};

use crate::utils::MathError;
use alloy_primitives::Address;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExternalError {
    #[error("price unavailable for {0}")]
    PriceUnavailable(Address),
    #[error("exchange does not know token {0}")]
    UnknownToken(Address),
    #[error("swap {from} -> {to} failed: {reason}")]
    SwapFailed { from: Address, to: Address, reason: String },
    #[error(transparent)]
    Math(#[from] MathError),
}
