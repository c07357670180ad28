use crate::error::{RouterError, RouterResult};
use crate::strategies::Strategy;
use crate::utils::config_loader::{
    LoadConfigError, RouterConfigLoader, RouterConfigLoaderSync, load_from_file, load_from_file_sync,
};
use crate::utils::{BPS_DENOMINATOR, Token, UNIFORM_DECIMALS, parse_uniform};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Decimal strings ("0.9") in files, uniform `U256` in memory.
mod uniform_amount {
    use crate::utils::{UNIFORM_DECIMALS, parse_uniform};
    use alloy_primitives::U256;
    use alloy_primitives::utils::format_units;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = format_units(*value, UNIFORM_DECIMALS).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_uniform(&raw).map_err(serde::de::Error::custom)
    }
}

/// Router parameters. USD amounts are uniform (18 decimals).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Administrator allowed to manage strategies, tokens and parameters
    pub owner: Address,
    /// Minimum batch value for a cycle to close
    #[serde(with = "uniform_amount")]
    pub min_usd_per_cycle: U256,
    /// Minimum value of a single batch deposit
    #[serde(with = "uniform_amount")]
    pub min_deposit: U256,
    /// Seconds that must pass between two cycle closes
    pub cycle_duration_secs: u64,
    /// Performance fee on compounded yield, in basis points
    pub fee_percent_bps: u64,
    /// Receiver of performance fee shares
    pub fee_address: Address,
    /// Swaps worth less than this are skipped while rebalancing
    #[serde(with = "uniform_amount")]
    pub rebalance_swap_threshold: U256,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            owner: Address::ZERO,
            // 0.9 USD
            min_usd_per_cycle: U256::from(900_000_000_000_000_000u64),
            // 0.0001 USD
            min_deposit: U256::from(100_000_000_000_000u64),
            cycle_duration_secs: 3600,
            fee_percent_bps: 2000,
            fee_address: Address::ZERO,
            // 0.01 USD
            rebalance_swap_threshold: U256::from(10_000_000_000_000_000u64),
        }
    }
}

impl RouterConfig {
    /// Defaults overridden by `ROUTER_*` environment variables (and `.env`).
    pub fn from_env() -> eyre::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(owner) = std::env::var("ROUTER_OWNER") {
            config.owner = Address::from_str(&owner).map_err(|e| eyre::eyre!("Invalid ROUTER_OWNER: {}", e))?;
        }

        if let Ok(min_usd) = std::env::var("ROUTER_MIN_USD_PER_CYCLE") {
            config.min_usd_per_cycle = parse_uniform(&min_usd)?;
        }

        if let Ok(min_deposit) = std::env::var("ROUTER_MIN_DEPOSIT") {
            config.min_deposit = parse_uniform(&min_deposit)?;
        }

        if let Ok(duration) = std::env::var("ROUTER_CYCLE_DURATION_SECS") {
            config.cycle_duration_secs =
                duration.parse().map_err(|e| eyre::eyre!("Invalid ROUTER_CYCLE_DURATION_SECS: {}", e))?;
        }

        if let Ok(fee) = std::env::var("ROUTER_FEE_PERCENT_BPS") {
            config.fee_percent_bps = fee.parse().map_err(|e| eyre::eyre!("Invalid ROUTER_FEE_PERCENT_BPS: {}", e))?;
        }

        if let Ok(fee_address) = std::env::var("ROUTER_FEE_ADDRESS") {
            config.fee_address =
                Address::from_str(&fee_address).map_err(|e| eyre::eyre!("Invalid ROUTER_FEE_ADDRESS: {}", e))?;
        }

        if let Ok(threshold) = std::env::var("ROUTER_REBALANCE_SWAP_THRESHOLD") {
            config.rebalance_swap_threshold = parse_uniform(&threshold)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RouterResult<()> {
        if self.fee_percent_bps > BPS_DENOMINATOR {
            return Err(RouterError::InvalidParameter {
                name: "fee_percent_bps",
                reason: format!("{} exceeds {}", self.fee_percent_bps, BPS_DENOMINATOR),
            });
        }
        Ok(())
    }

    pub fn with_owner(mut self, owner: Address) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_cycle_duration(mut self, secs: u64) -> Self {
        self.cycle_duration_secs = secs;
        self
    }

    pub fn with_fee(mut self, fee_percent_bps: u64, fee_address: Address) -> Self {
        self.fee_percent_bps = fee_percent_bps;
        self.fee_address = fee_address;
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    pub address: Address,
    pub symbol: Option<String>,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Fixed USD price, used when the router builds its own oracle
    pub price: Option<String>,
}

fn default_decimals() -> u8 {
    UNIFORM_DECIMALS
}

impl TokenConfig {
    pub fn to_token(&self) -> Token {
        Token::new_with_data(self.address, self.symbol.clone(), None, Some(self.decimals))
    }

    pub fn uniform_price(&self) -> RouterResult<Option<U256>> {
        self.price
            .as_deref()
            .map(parse_uniform)
            .transpose()
            .map_err(|e| RouterError::InvalidParameter { name: "price", reason: e.to_string() })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    pub weight: u64,
    pub strategy: Box<dyn Strategy>,
}

/// A complete deployment: parameters, supported tokens and initial strategies.
#[derive(Clone, Debug, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub exchange_fee_bps: u64,
    pub router: RouterConfig,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Clone, Deserialize, Debug)]
struct RouterConfigRoot {
    router: RouterConfig,
}

#[async_trait]
impl RouterConfigLoader for RouterConfig {
    type SectionType = RouterConfig;

    async fn load_section_from_file(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let root: RouterConfigRoot = load_from_file(file_name).await?;
        Ok(root.router)
    }
}

impl RouterConfigLoaderSync for RouterConfig {
    type SectionType = RouterConfig;

    fn load_section_from_file_sync(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let root: RouterConfigRoot = load_from_file_sync(file_name)?;
        Ok(root.router)
    }
}

#[async_trait]
impl RouterConfigLoader for DeploymentConfig {
    type SectionType = DeploymentConfig;

    async fn load_section_from_file(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        load_from_file(file_name).await
    }
}

impl RouterConfigLoaderSync for DeploymentConfig {
    type SectionType = DeploymentConfig;

    fn load_section_from_file_sync(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        load_from_file_sync(file_name)
    }
}
