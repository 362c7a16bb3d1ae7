// 7.0 config.rs: pool-wide settings in one place. collateral, solvency floors, rewards, oracle.
// per-symbol params live next to their pricing code (symbol/futures.rs, symbol/option.rs).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{AssetId, Quote};

// A non-base asset the pool accepts as trader margin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralConfig {
    pub asset: AssetId,
    // oracle feed quoting this asset in base units (e.g. "BNBUSD")
    pub price_feed: String,
    // haircut applied when valuing the asset as margin (0.8 = 80% counts)
    pub collateral_factor: Decimal,
}

/** 7.1: pool settings. floors are checked on every liquidity removal */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    // settlement asset: LP liquidity, PnL, fees and rewards are all in this
    pub base_asset: AssetId,
    // asset that arrives as attached value instead of a token transfer
    pub native_asset: AssetId,
    // accepted non-base collateral (the native asset included)
    pub collaterals: Vec<CollateralConfig>,
    // pool equity / aggregate net symbol notional must stay above this
    pub min_pool_margin_ratio: Decimal,
    // absolute equity floor while any net exposure is open
    pub min_liquidity_requirement: Quote,
    // share of trading fees kept by the protocol instead of the pool
    pub protocol_fee_collect_ratio: Decimal,
    pub min_liquidation_reward: Quote,
    pub max_liquidation_reward: Quote,
    // max shortfall versus oracle value when swapping collateral to base
    pub max_swap_slippage: Decimal,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_asset: AssetId::new("BUSD"),
            native_asset: AssetId::new("BNB"),
            collaterals: vec![
                CollateralConfig {
                    asset: AssetId::new("BNB"),
                    price_feed: "BNBUSD".to_string(),
                    collateral_factor: dec!(0.8),
                },
                CollateralConfig {
                    asset: AssetId::new("CAKE"),
                    price_feed: "CAKEUSD".to_string(),
                    collateral_factor: dec!(0.5),
                },
            ],
            min_pool_margin_ratio: dec!(0.25),
            min_liquidity_requirement: Quote::new(dec!(1000)),
            protocol_fee_collect_ratio: dec!(0.2),
            min_liquidation_reward: Quote::new(dec!(10)),
            max_liquidation_reward: Quote::new(dec!(1000)),
            max_swap_slippage: dec!(0.1),
        }
    }
}

impl PoolConfig {
    pub fn collateral(&self, asset: &AssetId) -> Option<&CollateralConfig> {
        self.collaterals.iter().find(|c| &c.asset == asset)
    }

    pub fn is_supported(&self, asset: &AssetId) -> bool {
        *asset == self.base_asset || self.collateral(asset).is_some()
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_pool_margin_ratio < Decimal::ZERO {
            return Err(ConfigError::InvalidPool {
                reason: "pool margin ratio floor must be non-negative".to_string(),
            });
        }

        if self.min_liquidity_requirement.is_negative() {
            return Err(ConfigError::InvalidPool {
                reason: "liquidity requirement must be non-negative".to_string(),
            });
        }

        if self.protocol_fee_collect_ratio < Decimal::ZERO
            || self.protocol_fee_collect_ratio > Decimal::ONE
        {
            return Err(ConfigError::InvalidPool {
                reason: "protocol fee ratio must be within [0, 1]".to_string(),
            });
        }

        if self.min_liquidation_reward.is_negative()
            || self.max_liquidation_reward < self.min_liquidation_reward
        {
            return Err(ConfigError::InvalidPool {
                reason: "liquidation reward bounds out of order".to_string(),
            });
        }

        if self.max_swap_slippage < Decimal::ZERO || self.max_swap_slippage >= Decimal::ONE {
            return Err(ConfigError::InvalidPool {
                reason: "swap slippage must be within [0, 1)".to_string(),
            });
        }

        for collateral in &self.collaterals {
            if collateral.asset == self.base_asset {
                return Err(ConfigError::InvalidCollateral {
                    asset: collateral.asset.clone(),
                    reason: "base asset cannot be listed as collateral".to_string(),
                });
            }
            if collateral.collateral_factor <= Decimal::ZERO
                || collateral.collateral_factor > Decimal::ONE
            {
                return Err(ConfigError::InvalidCollateral {
                    asset: collateral.asset.clone(),
                    reason: "collateral factor must be within (0, 1]".to_string(),
                });
            }
        }

        if self.native_asset != self.base_asset && self.collateral(&self.native_asset).is_none() {
            return Err(ConfigError::InvalidCollateral {
                asset: self.native_asset.clone(),
                reason: "native asset needs a collateral entry".to_string(),
            });
        }

        Ok(())
    }
}

// Oracle read policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    // values older than this fail the whole operation
    pub max_staleness_secs: i64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_staleness_secs: 60,
        }
    }
}

impl OracleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_staleness_secs <= 0 {
            return Err(ConfigError::InvalidOracle {
                reason: "staleness bound must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid pool config: {reason}")]
    InvalidPool { reason: String },

    #[error("Invalid collateral {asset}: {reason}")]
    InvalidCollateral { asset: AssetId, reason: String },

    #[error("Invalid oracle config: {reason}")]
    InvalidOracle { reason: String },

    #[error("Invalid symbol {symbol}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}
