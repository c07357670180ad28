use alloy_primitives::U256;

/// Decimals of the uniform accounting unit.
pub const UNIFORM_DECIMALS: u8 = 18;

/// 1.0 in uniform units (1e18).
pub const PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Shares minted per uniform unit of value in the very first cycle.
pub const INITIAL_SHARES_PER_UNIT: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Denominator for every basis-point parameter (fees, weights in tests).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Sentinel meaning "the whole remaining amount" in withdrawal requests.
pub const MAX_AMOUNT: U256 = U256::MAX;
