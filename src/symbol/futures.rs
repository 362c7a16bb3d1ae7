// 2.1 symbol/futures.rs: linear perpetual. mark = index, funding follows the pool's net skew.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{Instrument, PricingContext, SymbolQuote};
use crate::config::ConfigError;
use crate::funding::{calculate_funding_rate, calculate_premium_index, skew_price};
use crate::oracle::OracleSnapshot;
use crate::types::{Price, SignedSize, SymbolId, Timestamp};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuturesParams {
    pub price_feed: String,
    pub fee_rate: Decimal,
    // skew sensitivity: rate = coefficient * net notional / liquidity
    pub funding_rate_coefficient: Decimal,
    pub max_funding_rate: Decimal,
    pub funding_period: i64,
    pub min_trade_volume: Decimal,
    pub min_initial_margin_ratio: Decimal,
    pub min_maintenance_margin_ratio: Decimal,
    pub max_leverage: Decimal,
    pub liquidation_reward_ratio: Decimal,
    pub forced_funding_price_move_threshold: Decimal,
    pub forced_funding_time_threshold: i64,
}

impl FuturesParams {
    pub fn btc_usd() -> Self {
        Self {
            price_feed: "BTCUSD".to_string(),
            fee_rate: dec!(0.001),
            funding_rate_coefficient: dec!(0.02),
            max_funding_rate: dec!(0.01),
            funding_period: 86_400,
            min_trade_volume: dec!(0.001),
            min_initial_margin_ratio: dec!(0.1),
            min_maintenance_margin_ratio: dec!(0.05),
            max_leverage: dec!(10),
            liquidation_reward_ratio: dec!(0.5),
            forced_funding_price_move_threshold: dec!(0.01),
            forced_funding_time_threshold: 3_600,
        }
    }

    pub fn eth_usd() -> Self {
        Self {
            price_feed: "ETHUSD".to_string(),
            fee_rate: dec!(0.002),
            min_trade_volume: dec!(0.01),
            ..Self::btc_usd()
        }
    }

    // leverage caps the ratio from below: 10x means at least 10% initial
    pub fn initial_margin_ratio(&self) -> Decimal {
        self.min_initial_margin_ratio.max(Decimal::ONE / self.max_leverage)
    }

    pub fn validate(&self, name: &SymbolId) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSymbol {
            symbol: name.to_string(),
            reason: reason.to_string(),
        };

        if self.fee_rate < Decimal::ZERO || self.fee_rate >= Decimal::ONE {
            return Err(invalid("fee rate must be within [0, 1)"));
        }
        if self.funding_period <= 0 {
            return Err(invalid("funding period must be positive"));
        }
        if self.funding_rate_coefficient < Decimal::ZERO || self.max_funding_rate < Decimal::ZERO {
            return Err(invalid("funding parameters must be non-negative"));
        }
        if self.min_trade_volume < Decimal::ZERO {
            return Err(invalid("min trade volume must be non-negative"));
        }
        if self.max_leverage <= Decimal::ZERO {
            return Err(invalid("max leverage must be positive"));
        }
        if self.min_maintenance_margin_ratio <= Decimal::ZERO
            || self.min_maintenance_margin_ratio > self.initial_margin_ratio()
        {
            return Err(invalid("maintenance ratio must be positive and at most the initial ratio"));
        }
        if self.liquidation_reward_ratio < Decimal::ZERO || self.liquidation_reward_ratio > Decimal::ONE {
            return Err(invalid("liquidation reward ratio must be within [0, 1]"));
        }
        if self.forced_funding_price_move_threshold < Decimal::ZERO
            || self.forced_funding_time_threshold < 0
        {
            return Err(invalid("forced funding thresholds must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuturesSymbol {
    pub name: SymbolId,
    pub params: FuturesParams,
}

impl FuturesSymbol {
    pub fn new(name: impl Into<SymbolId>, params: FuturesParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn btc_usd() -> Self {
        Self::new("BTCUSD", FuturesParams::btc_usd())
    }
}

impl Instrument for FuturesSymbol {
    fn name(&self) -> &SymbolId {
        &self.name
    }

    fn feeds(&self) -> Vec<&str> {
        vec![self.params.price_feed.as_str()]
    }

    fn index_price(&self, oracle: &OracleSnapshot) -> Result<Price, crate::oracle::OracleError> {
        oracle.price(&self.params.price_feed)
    }

    fn quote(&self, ctx: &PricingContext<'_>, net_volume: SignedSize) -> Result<SymbolQuote, super::SymbolError> {
        let index = self.index_price(ctx.oracle)?;
        let p = &self.params;

        let skew = skew_price(index, net_volume, p.funding_rate_coefficient, ctx.liquidity);
        let funding_rate = calculate_funding_rate(calculate_premium_index(skew, index), p.max_funding_rate);

        Ok(SymbolQuote {
            index_price: index,
            mark_price: index.value(),
            funding_rate,
            funding_per_period: funding_rate * index.value(),
            fee_per_unit: index.value() * p.fee_rate,
            initial_margin_per_unit: index.value() * p.initial_margin_ratio(),
            maintenance_margin_per_unit: index.value() * p.min_maintenance_margin_ratio,
        })
    }

    fn expires_at(&self) -> Option<Timestamp> {
        None
    }

    fn funding_period(&self) -> i64 {
        self.params.funding_period
    }

    fn min_trade_volume(&self) -> Decimal {
        self.params.min_trade_volume
    }

    fn liquidation_reward_ratio(&self) -> Decimal {
        self.params.liquidation_reward_ratio
    }

    fn forced_funding_thresholds(&self) -> (Decimal, i64) {
        (
            self.params.forced_funding_price_move_threshold,
            self.params.forced_funding_time_threshold,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate(&self.name)
    }
}
