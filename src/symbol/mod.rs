// 2.0 symbol/: one tradable instrument each. the `Instrument` trait is what the two
// variants share (price, margin, expiry); `SymbolState` carries the book every symbol
// keeps: net exposure, cumulative funding, and the positions themselves.

mod futures;
mod option;

pub use futures::{FuturesParams, FuturesSymbol};
pub use option::{OptionExpiry, OptionParams, OptionSymbol};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ConfigError;
use crate::funding::{accrue_funding_index, prorate};
use crate::oracle::{OracleError, OracleSnapshot};
use crate::position::Position;
use crate::types::{AccountId, Price, Quote, SignedSize, SymbolId, Timestamp};

/// Everything pricing needs from outside the symbol, read once per operation.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    pub oracle: &'a OracleSnapshot,
    pub now: Timestamp,
    // pool book NAV at the start of the operation, used for skew
    pub liquidity: Quote,
}

impl<'a> PricingContext<'a> {
    pub fn new(oracle: &'a OracleSnapshot, now: Timestamp, liquidity: Quote) -> Self {
        Self { oracle, now, liquidity }
    }
}

/// Per-unit prices and requirements at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolQuote {
    pub index_price: Price,
    pub mark_price: Decimal,
    pub funding_rate: Decimal,
    // paid by each long unit per funding period (negative: longs receive)
    pub funding_per_period: Decimal,
    pub fee_per_unit: Decimal,
    pub initial_margin_per_unit: Decimal,
    pub maintenance_margin_per_unit: Decimal,
}

pub trait Instrument {
    fn name(&self) -> &SymbolId;
    /// Oracle feeds this symbol reads
    fn feeds(&self) -> Vec<&str>;
    fn index_price(&self, oracle: &OracleSnapshot) -> Result<Price, OracleError>;
    fn quote(&self, ctx: &PricingContext<'_>, net_volume: SignedSize) -> Result<SymbolQuote, SymbolError>;
    fn expires_at(&self) -> Option<Timestamp>;
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at().map(|at| now >= at).unwrap_or(false)
    }
    fn funding_period(&self) -> i64;
    fn min_trade_volume(&self) -> Decimal;
    fn liquidation_reward_ratio(&self) -> Decimal;
    /// (relative index move, seconds) past which other symbols accrue eagerly
    fn forced_funding_thresholds(&self) -> (Decimal, i64);
    fn validate(&self) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Symbol {
    Futures(FuturesSymbol),
    Option(OptionSymbol),
}

impl Instrument for Symbol {
    fn name(&self) -> &SymbolId {
        match self {
            Symbol::Futures(s) => s.name(),
            Symbol::Option(s) => s.name(),
        }
    }

    fn feeds(&self) -> Vec<&str> {
        match self {
            Symbol::Futures(s) => s.feeds(),
            Symbol::Option(s) => s.feeds(),
        }
    }

    fn index_price(&self, oracle: &OracleSnapshot) -> Result<Price, OracleError> {
        match self {
            Symbol::Futures(s) => s.index_price(oracle),
            Symbol::Option(s) => s.index_price(oracle),
        }
    }

    fn quote(&self, ctx: &PricingContext<'_>, net_volume: SignedSize) -> Result<SymbolQuote, SymbolError> {
        match self {
            Symbol::Futures(s) => s.quote(ctx, net_volume),
            Symbol::Option(s) => s.quote(ctx, net_volume),
        }
    }

    fn expires_at(&self) -> Option<Timestamp> {
        match self {
            Symbol::Futures(s) => s.expires_at(),
            Symbol::Option(s) => s.expires_at(),
        }
    }

    fn funding_period(&self) -> i64 {
        match self {
            Symbol::Futures(s) => s.funding_period(),
            Symbol::Option(s) => s.funding_period(),
        }
    }

    fn min_trade_volume(&self) -> Decimal {
        match self {
            Symbol::Futures(s) => s.min_trade_volume(),
            Symbol::Option(s) => s.min_trade_volume(),
        }
    }

    fn liquidation_reward_ratio(&self) -> Decimal {
        match self {
            Symbol::Futures(s) => s.liquidation_reward_ratio(),
            Symbol::Option(s) => s.liquidation_reward_ratio(),
        }
    }

    fn forced_funding_thresholds(&self) -> (Decimal, i64) {
        match self {
            Symbol::Futures(s) => s.forced_funding_thresholds(),
            Symbol::Option(s) => s.forced_funding_thresholds(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Symbol::Futures(s) => s.validate(),
            Symbol::Option(s) => s.validate(),
        }
    }
}

impl From<FuturesSymbol> for Symbol {
    fn from(symbol: FuturesSymbol) -> Self {
        Symbol::Futures(symbol)
    }
}

impl From<OptionSymbol> for Symbol {
    fn from(symbol: OptionSymbol) -> Self {
        Symbol::Option(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolStatus {
    Active,
    // reducing trades only
    CloseOnly,
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("Unknown symbol {0}")]
    UnknownSymbol(SymbolId),

    #[error("Symbol {0} already exists")]
    DuplicateSymbol(SymbolId),

    #[error("Symbol {symbol} not open for this trade ({status:?})")]
    TradingHalted { symbol: SymbolId, status: SymbolStatus },

    #[error("Symbol {symbol} expired at {expired_at}")]
    Expired { symbol: SymbolId, expired_at: Timestamp },

    #[error("Symbol {0} has not expired")]
    NotExpired(SymbolId),

    #[error("Account {trader:?} holds no position in {symbol}")]
    NoPosition { symbol: SymbolId, trader: AccountId },

    #[error("Volume {volume} below minimum {minimum} for {symbol}")]
    BelowMinTradeVolume { symbol: SymbolId, volume: Decimal, minimum: Decimal },

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// What one settlement did to a trader's position on one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSettlement {
    pub symbol: SymbolId,
    pub trade_price: Decimal,
    pub realized_pnl: Quote,
    // positive = trader paid
    pub funding: Quote,
    pub fee: Quote,
    pub old_volume: SignedSize,
    pub new_volume: SignedSize,
    // |traded volume| * index
    pub traded_notional: Quote,
}

impl TradeSettlement {
    // signed amount credited to the trader's base balance
    pub fn net_to_trader(&self) -> Quote {
        self.realized_pnl.sub(self.funding).sub(self.fee)
    }

    pub fn increased_exposure(&self) -> bool {
        self.old_volume.is_increased_by(self.new_volume)
    }
}

/// Risk figures for one trader position under one quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRisk {
    pub unrealized_pnl: Quote,
    pub notional: Quote,
    pub initial_margin: Quote,
    pub maintenance_margin: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolState {
    pub symbol: Symbol,
    pub status: SymbolStatus,
    pub net_volume: SignedSize,
    pub net_cost: Quote,
    pub cumulative_funding_index: Decimal,
    // sum of volume * funding snapshot over positions
    pub funding_basis: Decimal,
    pub last_funding_timestamp: Timestamp,
    pub last_index_price: Option<Price>,
    pub positions: BTreeMap<AccountId, Position>,
}

impl SymbolState {
    pub fn new(symbol: Symbol, now: Timestamp) -> Self {
        Self {
            symbol,
            status: SymbolStatus::Active,
            net_volume: SignedSize::zero(),
            net_cost: Quote::zero(),
            cumulative_funding_index: Decimal::ZERO,
            funding_basis: Decimal::ZERO,
            last_funding_timestamp: now,
            last_index_price: None,
            positions: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &SymbolId {
        self.symbol.name()
    }

    pub fn position(&self, trader: AccountId) -> Option<&Position> {
        self.positions.get(&trader)
    }

    pub fn quote(&self, ctx: &PricingContext<'_>) -> Result<SymbolQuote, SymbolError> {
        self.symbol.quote(ctx, self.net_volume)
    }

    // 2.3: cumulative index as it would be if accrued now. pure
    pub fn preview_funding_index(&self, quote: &SymbolQuote, now: Timestamp) -> Decimal {
        accrue_funding_index(
            self.cumulative_funding_index,
            quote.funding_per_period,
            self.last_funding_timestamp.secs_until(now),
            self.symbol.funding_period(),
        )
    }

    /// Folds the elapsed time into the cumulative index and returns the quote
    /// used for it. Idempotent within one timestamp.
    pub fn accrue(&mut self, ctx: &PricingContext<'_>) -> Result<SymbolQuote, SymbolError> {
        let quote = self.quote(ctx)?;
        let elapsed = self.last_funding_timestamp.secs_until(ctx.now);
        if elapsed > 0 {
            let per_unit = prorate(quote.funding_per_period, elapsed, self.symbol.funding_period());
            tracing::debug!(
                symbol = %self.name(),
                elapsed,
                rate = %quote.funding_rate,
                per_unit = %per_unit,
                "accrued funding"
            );
        }
        self.cumulative_funding_index = self.preview_funding_index(&quote, ctx.now);
        self.last_funding_timestamp = self.last_funding_timestamp.max(ctx.now);
        self.last_index_price = Some(quote.index_price);
        Ok(quote)
    }

    // 2.4: other symbols of the trader accrue eagerly only after a big move or a long gap
    pub fn needs_forced_accrual(&self, index_price: Price, now: Timestamp) -> bool {
        let (price_move, max_gap) = self.symbol.forced_funding_thresholds();
        let moved = self
            .last_index_price
            .map(|last| last.relative_change(index_price) >= price_move)
            .unwrap_or(true);
        moved || self.last_funding_timestamp.secs_until(now) >= max_gap
    }

    /// Trader-initiated volume change. Checks status, expiry and minimum size,
    /// accrues funding, then settles.
    pub fn trade(
        &mut self,
        trader: AccountId,
        volume: SignedSize,
        ctx: &PricingContext<'_>,
    ) -> Result<TradeSettlement, SymbolError> {
        if let Some(expired_at) = self.symbol.expires_at().filter(|_| self.symbol.is_expired(ctx.now)) {
            return Err(SymbolError::Expired {
                symbol: self.name().clone(),
                expired_at,
            });
        }

        let old_volume = self.position(trader).map(|p| p.volume).unwrap_or_default();
        let new_volume = old_volume.add(volume.value());
        match self.status {
            SymbolStatus::Active => {}
            SymbolStatus::CloseOnly if !old_volume.is_increased_by(new_volume) => {}
            status => {
                return Err(SymbolError::TradingHalted {
                    symbol: self.name().clone(),
                    status,
                })
            }
        }

        let minimum = self.symbol.min_trade_volume();
        if !volume.is_zero() && volume.abs() < minimum {
            return Err(SymbolError::BelowMinTradeVolume {
                symbol: self.name().clone(),
                volume: volume.value(),
                minimum,
            });
        }

        let quote = self.accrue(ctx)?;
        Ok(self.settle(trader, volume, &quote, true))
    }

    /// Closes the whole position at mark, no fee. Used by liquidation and
    /// expiry settlement, so status and expiry are not checked.
    pub fn close_position(
        &mut self,
        trader: AccountId,
        ctx: &PricingContext<'_>,
    ) -> Result<Option<TradeSettlement>, SymbolError> {
        let Some(volume) = self.position(trader).map(|p| p.volume) else {
            return Ok(None);
        };
        let quote = self.accrue(ctx)?;
        Ok(Some(self.settle(trader, SignedSize::new(-volume.value()), &quote, false)))
    }

    // 2.5: funding first, then the volume change, then the aggregates
    fn settle(
        &mut self,
        trader: AccountId,
        volume: SignedSize,
        quote: &SymbolQuote,
        charge_fee: bool,
    ) -> TradeSettlement {
        let index = self.cumulative_funding_index;
        let mut position = self
            .positions
            .remove(&trader)
            .unwrap_or_else(|| Position::new(index));

        let old_cost = position.cost;
        let old_snapshot = position.volume.value() * position.last_cumulative_funding_index;

        let funding = position.settle_funding(index);
        let change = position.apply_trade(volume, quote.mark_price);

        self.net_volume = self.net_volume.add(volume.value());
        self.net_cost = self.net_cost.add(position.cost.sub(old_cost));
        self.funding_basis += position.volume.value() * index - old_snapshot;

        let fee = if charge_fee {
            Quote::new(volume.abs() * quote.fee_per_unit)
        } else {
            Quote::zero()
        };

        if !position.is_empty() {
            self.positions.insert(trader, position);
        }

        TradeSettlement {
            symbol: self.name().clone(),
            trade_price: quote.mark_price,
            realized_pnl: change.realized_pnl,
            funding,
            fee,
            old_volume: change.old_volume,
            new_volume: change.new_volume,
            traded_notional: Quote::new(volume.abs() * quote.index_price.value()),
        }
    }

    // 2.6: risk of one trader's position, against a quote and a (maybe previewed) index
    pub fn position_risk(
        &self,
        trader: AccountId,
        quote: &SymbolQuote,
        funding_index: Decimal,
    ) -> Option<PositionRisk> {
        let position = self.positions.get(&trader)?;
        let size = position.volume.abs();
        Some(PositionRisk {
            unrealized_pnl: position.unrealized_pnl(quote.mark_price, funding_index),
            notional: position.notional(quote.index_price),
            initial_margin: Quote::new(size * quote.initial_margin_per_unit),
            maintenance_margin: Quote::new(size * quote.maintenance_margin_per_unit),
        })
    }

    // aggregate trader pnl against the pool, funding owed to the pool netted in
    pub fn traders_unrealized_pnl(&self, quote: &SymbolQuote, funding_index: Decimal) -> Quote {
        let price_pnl = self.net_volume.value() * quote.mark_price - self.net_cost.value();
        let owed_funding = self.net_volume.value() * funding_index - self.funding_basis;
        Quote::new(price_pnl - owed_funding)
    }

    pub fn net_notional(&self, quote: &SymbolQuote) -> Quote {
        Quote::new(self.net_volume.abs() * quote.index_price.value())
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleManager;
    use rust_decimal_macros::dec;

    fn oracle_at(btc: Decimal, ts: i64) -> OracleSnapshot {
        let mut oracle = OracleManager::new();
        oracle.set_value("BTCUSD", btc, Timestamp::from_secs(ts));
        OracleSnapshot::capture(&oracle, ["BTCUSD"], Timestamp::from_secs(ts), 60).unwrap()
    }

    fn btc_state() -> SymbolState {
        SymbolState::new(FuturesSymbol::btc_usd().into(), Timestamp::from_secs(0))
    }

    fn liquidity() -> Quote {
        Quote::new(dec!(1_000_000))
    }

    #[test]
    fn test_trade_opens_position_and_charges_fee() {
        let mut state = btc_state();
        let oracle = oracle_at(dec!(50000), 0);
        let ctx = PricingContext::new(&oracle, Timestamp::from_secs(0), liquidity());

        let settlement = state.trade(AccountId(1), SignedSize::new(dec!(2)), &ctx).unwrap();
        assert_eq!(settlement.fee.value(), dec!(100));
        assert_eq!(settlement.realized_pnl, Quote::zero());
        assert_eq!(settlement.net_to_trader().value(), dec!(-100));
        assert!(settlement.increased_exposure());
        assert_eq!(state.net_volume.value(), dec!(2));
        assert_eq!(state.net_cost.value(), dec!(100000));
    }

    #[test]
    fn test_funding_accrues_lazily_and_nets_to_pool() {
        let mut state = btc_state();
        let t0 = oracle_at(dec!(50000), 0);
        let ctx0 = PricingContext::new(&t0, Timestamp::from_secs(0), liquidity());
        state.trade(AccountId(1), SignedSize::new(dec!(3)), &ctx0).unwrap();
        state.trade(AccountId(2), SignedSize::new(dec!(-1)), &ctx0).unwrap();

        // net long 2 at 50k over 1M: 0.2% per day = 100 per unit per day
        let t1 = oracle_at(dec!(50000), 86_400);
        let ctx1 = PricingContext::new(&t1, Timestamp::from_secs(86_400), liquidity());
        let long = state.trade(AccountId(1), SignedSize::zero(), &ctx1).unwrap();
        let short = state.trade(AccountId(2), SignedSize::zero(), &ctx1).unwrap();

        assert_eq!(state.cumulative_funding_index, dec!(100));
        assert_eq!(long.funding.value(), dec!(300));
        assert_eq!(short.funding.value(), dec!(-100));
        assert_eq!(long.new_volume.value(), dec!(3));

        // everything settled: nothing left owed to the pool
        let quote = state.quote(&ctx1).unwrap();
        assert_eq!(state.traders_unrealized_pnl(&quote, state.cumulative_funding_index), Quote::zero());
    }

    #[test]
    fn test_pending_funding_shows_in_aggregate() {
        let mut state = btc_state();
        let t0 = oracle_at(dec!(50000), 0);
        let ctx0 = PricingContext::new(&t0, Timestamp::from_secs(0), liquidity());
        state.trade(AccountId(1), SignedSize::new(dec!(2)), &ctx0).unwrap();

        let t1 = oracle_at(dec!(50000), 43_200);
        let ctx1 = PricingContext::new(&t1, Timestamp::from_secs(43_200), liquidity());
        let quote = state.quote(&ctx1).unwrap();
        let index = state.preview_funding_index(&quote, ctx1.now);

        // half a day at 100 per unit per day
        assert_eq!(index, dec!(50));
        let risk = state.position_risk(AccountId(1), &quote, index).unwrap();
        assert_eq!(risk.unrealized_pnl.value(), dec!(-100));
        assert_eq!(state.traders_unrealized_pnl(&quote, index).value(), dec!(-100));
        assert_eq!(risk.initial_margin.value(), dec!(10000));
    }

    #[test]
    fn test_below_min_volume_rejected() {
        let mut state = btc_state();
        let oracle = oracle_at(dec!(50000), 0);
        let ctx = PricingContext::new(&oracle, Timestamp::from_secs(0), liquidity());

        let result = state.trade(AccountId(1), SignedSize::new(dec!(0.0001)), &ctx);
        assert!(matches!(result, Err(SymbolError::BelowMinTradeVolume { .. })));
    }

    #[test]
    fn test_close_only_blocks_increases() {
        let mut state = btc_state();
        let oracle = oracle_at(dec!(50000), 0);
        let ctx = PricingContext::new(&oracle, Timestamp::from_secs(0), liquidity());
        state.trade(AccountId(1), SignedSize::new(dec!(1)), &ctx).unwrap();

        state.status = SymbolStatus::CloseOnly;
        assert!(matches!(
            state.trade(AccountId(1), SignedSize::new(dec!(1)), &ctx),
            Err(SymbolError::TradingHalted { .. })
        ));
        assert!(state.trade(AccountId(1), SignedSize::new(dec!(-0.5)), &ctx).is_ok());

        state.status = SymbolStatus::Halted;
        assert!(state.trade(AccountId(1), SignedSize::new(dec!(-0.5)), &ctx).is_err());
    }

    #[test]
    fn test_close_position_no_fee() {
        let mut state = btc_state();
        let t0 = oracle_at(dec!(50000), 0);
        let ctx0 = PricingContext::new(&t0, Timestamp::from_secs(0), liquidity());
        state.trade(AccountId(1), SignedSize::new(dec!(1)), &ctx0).unwrap();

        let t1 = oracle_at(dec!(45000), 0);
        let ctx1 = PricingContext::new(&t1, Timestamp::from_secs(0), liquidity());
        let closed = state.close_position(AccountId(1), &ctx1).unwrap().unwrap();

        assert_eq!(closed.realized_pnl.value(), dec!(-5000));
        assert_eq!(closed.fee, Quote::zero());
        assert!(state.position(AccountId(1)).is_none());
        assert!(state.net_volume.is_zero());
        assert_eq!(state.net_cost, Quote::zero());
        assert_eq!(state.funding_basis, Decimal::ZERO);

        assert!(state.close_position(AccountId(1), &ctx1).unwrap().is_none());
    }

    #[test]
    fn test_forced_accrual_thresholds() {
        let mut state = btc_state();
        let oracle = oracle_at(dec!(50000), 0);
        let ctx = PricingContext::new(&oracle, Timestamp::from_secs(0), liquidity());
        state.accrue(&ctx).unwrap();

        let now = Timestamp::from_secs(60);
        assert!(!state.needs_forced_accrual(Price::new_unchecked(dec!(50200)), now));
        assert!(state.needs_forced_accrual(Price::new_unchecked(dec!(50500)), now));
        assert!(state.needs_forced_accrual(Price::new_unchecked(dec!(50000)), Timestamp::from_secs(3_600)));
    }

    #[test]
    fn test_expired_option_rejects_trade() {
        let params = OptionParams::btc_call(dec!(60000)).dated(Timestamp::from_secs(100));
        let mut state = SymbolState::new(
            OptionSymbol::new("BTCUSD-60000-C-100", params).into(),
            Timestamp::from_secs(0),
        );
        let mut oracle = OracleManager::new();
        oracle.set_value("BTCUSD", dec!(50000), Timestamp::from_secs(100));
        oracle.set_value("VOL-BTCUSD", dec!(0.9), Timestamp::from_secs(100));
        let snapshot =
            OracleSnapshot::capture(&oracle, ["BTCUSD", "VOL-BTCUSD"], Timestamp::from_secs(100), 60).unwrap();
        let ctx = PricingContext::new(&snapshot, Timestamp::from_secs(100), liquidity());

        let result = state.trade(AccountId(1), SignedSize::new(dec!(1)), &ctx);
        assert!(matches!(result, Err(SymbolError::Expired { .. })));
    }
}
