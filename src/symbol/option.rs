// 2.2 symbol/option.rs: options on an underlying feed, priced with Black-Scholes.
// perpetual (everlasting) options pay their time value as funding; dated ones decay
// through the premium and settle at intrinsic value once expired.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{Instrument, PricingContext, SymbolError, SymbolQuote};
use crate::config::ConfigError;
use crate::funding::calculate_funding_rate;
use crate::option_pricing::{black_scholes, years_from_secs, OptionInputs};
use crate::oracle::{OracleError, OracleSnapshot};
use crate::types::{Price, SignedSize, SymbolId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionExpiry {
    Perpetual,
    Dated { expires_at: Timestamp },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionParams {
    pub underlying_feed: String,
    pub volatility_feed: String,
    pub strike_price: Price,
    pub is_call: bool,
    pub expiry: OptionExpiry,
    pub fee_rate_itm: Decimal,
    pub fee_rate_otm: Decimal,
    // skew on top of the time value, same form as futures
    pub funding_rate_coefficient: Decimal,
    pub max_funding_rate: Decimal,
    pub funding_period: i64,
    pub min_trade_volume: Decimal,
    // floor on the initial requirement, as a share of underlying notional
    pub min_initial_margin_floor: Decimal,
    pub initial_margin_ratio: Decimal,
    pub maintenance_margin_ratio: Decimal,
    pub liquidation_reward_ratio: Decimal,
    pub forced_funding_price_move_threshold: Decimal,
    pub forced_funding_time_threshold: i64,
}

impl OptionParams {
    pub fn btc_call(strike: Decimal) -> Self {
        Self {
            underlying_feed: "BTCUSD".to_string(),
            volatility_feed: "VOL-BTCUSD".to_string(),
            strike_price: Price::new_unchecked(strike),
            is_call: true,
            expiry: OptionExpiry::Perpetual,
            fee_rate_itm: dec!(0.001),
            fee_rate_otm: dec!(0.04),
            funding_rate_coefficient: dec!(0.02),
            max_funding_rate: dec!(0.01),
            funding_period: 86_400,
            min_trade_volume: dec!(0.001),
            min_initial_margin_floor: dec!(0.01),
            initial_margin_ratio: dec!(0.1),
            maintenance_margin_ratio: dec!(0.05),
            liquidation_reward_ratio: dec!(0.5),
            forced_funding_price_move_threshold: dec!(0.01),
            forced_funding_time_threshold: 3_600,
        }
    }

    pub fn eth_put(strike: Decimal) -> Self {
        Self {
            underlying_feed: "ETHUSD".to_string(),
            volatility_feed: "VOL-ETHUSD".to_string(),
            is_call: false,
            min_trade_volume: dec!(0.01),
            ..Self::btc_call(strike)
        }
    }

    pub fn dated(mut self, expires_at: Timestamp) -> Self {
        self.expiry = OptionExpiry::Dated { expires_at };
        self
    }

    pub fn validate(&self, name: &SymbolId) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSymbol {
            symbol: name.to_string(),
            reason: reason.to_string(),
        };

        if self.strike_price.value() <= Decimal::ZERO {
            return Err(invalid("strike must be positive"));
        }
        for rate in [self.fee_rate_itm, self.fee_rate_otm] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(invalid("fee rates must be within [0, 1)"));
            }
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
        if self.initial_margin_ratio <= Decimal::ZERO
            || self.maintenance_margin_ratio <= Decimal::ZERO
            || self.maintenance_margin_ratio > self.initial_margin_ratio
        {
            return Err(invalid("margin ratios must be positive with maintenance <= initial"));
        }
        if self.min_initial_margin_floor < Decimal::ZERO {
            return Err(invalid("margin floor must be non-negative"));
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
pub struct OptionSymbol {
    pub name: SymbolId,
    pub params: OptionParams,
}

impl OptionSymbol {
    pub fn new(name: impl Into<SymbolId>, params: OptionParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    // years fed to the pricing model. perpetuals price as a constant one-period option
    fn time_to_expiry(&self, now: Timestamp) -> Decimal {
        match self.params.expiry {
            OptionExpiry::Perpetual => years_from_secs(self.params.funding_period),
            OptionExpiry::Dated { expires_at } => years_from_secs(now.secs_until(expires_at)),
        }
    }

    fn volatility(&self, oracle: &OracleSnapshot) -> Result<Decimal, OracleError> {
        oracle.value(&self.params.volatility_feed)
    }
}

impl Instrument for OptionSymbol {
    fn name(&self) -> &SymbolId {
        &self.name
    }

    fn feeds(&self) -> Vec<&str> {
        vec![
            self.params.underlying_feed.as_str(),
            self.params.volatility_feed.as_str(),
        ]
    }

    fn index_price(&self, oracle: &OracleSnapshot) -> Result<Price, OracleError> {
        oracle.price(&self.params.underlying_feed)
    }

    fn quote(&self, ctx: &PricingContext<'_>, net_volume: SignedSize) -> Result<SymbolQuote, SymbolError> {
        let p = &self.params;
        let index = self.index_price(ctx.oracle)?;
        let valuation = black_scholes(&OptionInputs {
            spot: index,
            strike: p.strike_price,
            volatility: self.volatility(ctx.oracle)?,
            time: self.time_to_expiry(ctx.now),
            is_call: p.is_call,
        });

        // expired: intrinsic only, nothing left to fund
        let expired = self.is_expired(ctx.now);
        let mark = if expired { valuation.intrinsic } else { valuation.premium };

        let (funding_rate, funding_per_period) = match p.expiry {
            OptionExpiry::Perpetual if ctx.liquidity.is_positive() => {
                let skew = p.funding_rate_coefficient * net_volume.value() * mark / ctx.liquidity.value();
                let rate = calculate_funding_rate(skew, p.max_funding_rate);
                (rate, valuation.time_value() + rate * mark)
            }
            OptionExpiry::Perpetual => (Decimal::ZERO, valuation.time_value()),
            OptionExpiry::Dated { .. } => (Decimal::ZERO, Decimal::ZERO),
        };

        let fee_per_unit = if valuation.is_in_the_money() {
            index.value() * p.fee_rate_itm
        } else {
            mark * p.fee_rate_otm
        };

        let initial_ratio = (valuation.delta.abs() * p.initial_margin_ratio).max(p.min_initial_margin_floor);
        let initial_margin_per_unit = index.value() * initial_ratio;
        let maintenance_margin_per_unit =
            initial_margin_per_unit * p.maintenance_margin_ratio / p.initial_margin_ratio;

        Ok(SymbolQuote {
            index_price: index,
            mark_price: mark,
            funding_rate,
            funding_per_period,
            fee_per_unit,
            initial_margin_per_unit,
            maintenance_margin_per_unit,
        })
    }

    fn expires_at(&self) -> Option<Timestamp> {
        match self.params.expiry {
            OptionExpiry::Perpetual => None,
            OptionExpiry::Dated { expires_at } => Some(expires_at),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleManager;
    use crate::types::Quote;

    fn snapshot(btc: Decimal, vol: Decimal) -> OracleSnapshot {
        let mut oracle = OracleManager::new();
        oracle.set_value("BTCUSD", btc, Timestamp::from_secs(0));
        oracle.set_value("VOL-BTCUSD", vol, Timestamp::from_secs(0));
        OracleSnapshot::capture(&oracle, ["BTCUSD", "VOL-BTCUSD"], Timestamp::from_secs(0), 60).unwrap()
    }

    fn ctx(oracle: &OracleSnapshot) -> PricingContext<'_> {
        PricingContext::new(oracle, Timestamp::from_secs(0), Quote::new(dec!(1_000_000)))
    }

    #[test]
    fn test_presets_valid() {
        let call = OptionSymbol::new("BTCUSD-60000-C", OptionParams::btc_call(dec!(60000)));
        assert!(call.validate().is_ok());
        let put = OptionSymbol::new("ETHUSD-5000-P", OptionParams::eth_put(dec!(5000)));
        assert!(put.validate().is_ok());
        assert!(!put.params.is_call);
        assert_eq!(put.min_trade_volume(), dec!(0.01));
        assert_eq!(call.min_trade_volume(), dec!(0.001));
    }

    #[test]
    fn test_otm_call_hits_margin_floor() {
        let call = OptionSymbol::new("BTCUSD-60000-C", OptionParams::btc_call(dec!(60000)));
        let oracle = snapshot(dec!(50000), dec!(0.9));
        let quote = call.quote(&ctx(&oracle), SignedSize::zero()).unwrap();

        // delta * 10% is far below the 1% floor
        assert_eq!(quote.initial_margin_per_unit, dec!(500));
        assert_eq!(quote.maintenance_margin_per_unit, dec!(250));
        // out of the money: fee charged on premium
        assert_eq!(quote.fee_per_unit, quote.mark_price * dec!(0.04));
        assert!(quote.mark_price < dec!(50));
        // flat book, funding is the time value alone
        assert_eq!(quote.funding_per_period, quote.mark_price);
    }

    #[test]
    fn test_itm_call_fee_on_index() {
        let call = OptionSymbol::new("BTCUSD-40000-C", OptionParams::btc_call(dec!(40000)));
        let oracle = snapshot(dec!(50000), dec!(0.9));
        let quote = call.quote(&ctx(&oracle), SignedSize::zero()).unwrap();

        assert_eq!(quote.fee_per_unit, dec!(50));
        assert!(quote.mark_price >= dec!(10000));
        // deep in the money, delta near one drives the requirement
        assert!(quote.initial_margin_per_unit > dec!(4900));
    }

    #[test]
    fn test_dated_option_expiry() {
        let params = OptionParams::btc_call(dec!(45000)).dated(Timestamp::from_secs(0));
        let call = OptionSymbol::new("BTCUSD-45000-C-0", params);
        let oracle = snapshot(dec!(50000), dec!(0.9));
        let quote = call.quote(&ctx(&oracle), SignedSize::new(dec!(3))).unwrap();

        assert!(call.is_expired(Timestamp::from_secs(0)));
        assert_eq!(quote.mark_price, dec!(5000));
        assert_eq!(quote.funding_per_period, Decimal::ZERO);
    }

    #[test]
    fn test_dated_option_live_before_expiry() {
        let params = OptionParams::btc_call(dec!(60000)).dated(Timestamp::from_secs(30 * 86_400));
        let call = OptionSymbol::new("BTCUSD-60000-C-30D", params);
        assert!(!call.is_expired(Timestamp::from_secs(0)));

        let oracle = snapshot(dec!(50000), dec!(0.9));
        let quote = call.quote(&ctx(&oracle), SignedSize::zero()).unwrap();
        assert!(quote.mark_price > dec!(100));
        assert_eq!(quote.funding_per_period, Decimal::ZERO);
    }

    #[test]
    fn test_missing_volatility_feed() {
        let call = OptionSymbol::new("BTCUSD-60000-C", OptionParams::btc_call(dec!(60000)));
        let mut oracle = OracleManager::new();
        oracle.set_value("BTCUSD", dec!(50000), Timestamp::from_secs(0));
        let snapshot = OracleSnapshot::capture(&oracle, ["BTCUSD"], Timestamp::from_secs(0), 60).unwrap();

        let result = call.quote(&ctx(&snapshot), SignedSize::zero());
        assert!(matches!(result, Err(SymbolError::Oracle(OracleError::UnknownFeed(_)))));
    }
}
