// 3.0 symbol_manager.rs: the registry of tradable symbols. routes trades to the right
// symbol, decides which symbols accrue on an interaction, and aggregates what the
// margin check and the pool solvency guard need.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::margin::PortfolioRisk;
use crate::symbol::{Instrument, PricingContext, Symbol, SymbolError, SymbolState, SymbolStatus, TradeSettlement};
use crate::types::{AccountId, Quote, SignedSize, SymbolId, Timestamp};

/// Net exposure of one symbol, from the pool's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolExposure {
    pub symbol: SymbolId,
    pub net_volume: SignedSize,
    pub net_notional: Quote,
    pub traders_unrealized_pnl: Quote,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolExposure {
    pub symbols: Vec<SymbolExposure>,
    pub total_net_notional: Quote,
    // what traders as a whole are up against the pool, funding owed netted in
    pub traders_unrealized_pnl: Quote,
}

/// Which symbols an interaction brings up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualScope<'a> {
    // pool operations: every symbol
    All,
    // trader operations: the traded symbol always, others only when forced
    Trader {
        trader: AccountId,
        traded: Option<&'a SymbolId>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolManager {
    symbols: BTreeMap<SymbolId, SymbolState>,
}

impl SymbolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&mut self, symbol: Symbol, now: Timestamp) -> Result<(), SymbolError> {
        let name = symbol.name().clone();
        if self.symbols.contains_key(&name) {
            return Err(SymbolError::DuplicateSymbol(name));
        }
        symbol.validate()?;
        self.symbols.insert(name, SymbolState::new(symbol, now));
        Ok(())
    }

    pub fn get(&self, symbol: &SymbolId) -> Result<&SymbolState, SymbolError> {
        self.symbols
            .get(symbol)
            .ok_or_else(|| SymbolError::UnknownSymbol(symbol.clone()))
    }

    fn get_mut(&mut self, symbol: &SymbolId) -> Result<&mut SymbolState, SymbolError> {
        self.symbols
            .get_mut(symbol)
            .ok_or_else(|| SymbolError::UnknownSymbol(symbol.clone()))
    }

    pub fn contains(&self, symbol: &SymbolId) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolState> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn set_status(&mut self, symbol: &SymbolId, status: SymbolStatus) -> Result<SymbolStatus, SymbolError> {
        let state = self.get_mut(symbol)?;
        Ok(std::mem::replace(&mut state.status, status))
    }

    // 3.1: feed sets. an operation snapshots exactly the feeds it depends on
    pub fn all_feeds(&self) -> BTreeSet<String> {
        self.symbols
            .values()
            .flat_map(|s| s.symbol.feeds())
            .map(str::to_string)
            .collect()
    }

    pub fn trader_feeds(&self, trader: AccountId, extra: Option<&SymbolId>) -> Result<BTreeSet<String>, SymbolError> {
        let mut feeds: BTreeSet<String> = self
            .trader_symbols(trader)
            .flat_map(|s| s.symbol.feeds())
            .map(str::to_string)
            .collect();
        if let Some(symbol) = extra {
            feeds.extend(self.get(symbol)?.symbol.feeds().into_iter().map(str::to_string));
        }
        Ok(feeds)
    }

    pub fn trader_symbols(&self, trader: AccountId) -> impl Iterator<Item = &SymbolState> {
        self.symbols
            .values()
            .filter(move |s| s.positions.contains_key(&trader))
    }

    pub fn has_positions(&self, trader: AccountId) -> bool {
        self.trader_symbols(trader).next().is_some()
    }

    // 3.2: lazy accrual. returns the symbols whose index moved forward
    pub fn settle_symbols(
        &mut self,
        ctx: &PricingContext<'_>,
        scope: AccrualScope<'_>,
    ) -> Result<Vec<SymbolId>, SymbolError> {
        let mut accrued = Vec::new();
        for (name, state) in self.symbols.iter_mut() {
            let due = match scope {
                AccrualScope::All => true,
                AccrualScope::Trader { traded, .. } if traded == Some(name) => true,
                AccrualScope::Trader { trader, .. } => {
                    state.positions.contains_key(&trader)
                        && state.needs_forced_accrual(state.symbol.index_price(ctx.oracle)?, ctx.now)
                }
            };
            if due {
                state.accrue(ctx)?;
                accrued.push(name.clone());
            }
        }
        Ok(accrued)
    }

    pub fn trade(
        &mut self,
        trader: AccountId,
        symbol: &SymbolId,
        volume: SignedSize,
        ctx: &PricingContext<'_>,
    ) -> Result<TradeSettlement, SymbolError> {
        self.get_mut(symbol)?.trade(trader, volume, ctx)
    }

    // 3.3: liquidation path. every position closed at mark, no fee
    pub fn close_all(&mut self, trader: AccountId, ctx: &PricingContext<'_>) -> Result<Vec<TradeSettlement>, SymbolError> {
        let mut closed = Vec::new();
        for state in self.symbols.values_mut() {
            if let Some(settlement) = state.close_position(trader, ctx)? {
                closed.push(settlement);
            }
        }
        Ok(closed)
    }

    /// Closes a position on an expired dated option at intrinsic value.
    pub fn settle_expired(
        &mut self,
        trader: AccountId,
        symbol: &SymbolId,
        ctx: &PricingContext<'_>,
    ) -> Result<TradeSettlement, SymbolError> {
        let state = self.get_mut(symbol)?;
        if !state.symbol.is_expired(ctx.now) {
            return Err(SymbolError::NotExpired(symbol.clone()));
        }
        state
            .close_position(trader, ctx)?
            .ok_or_else(|| SymbolError::NoPosition {
                symbol: symbol.clone(),
                trader,
            })
    }

    // 3.4: trader totals. symbols not accrued this operation are previewed
    pub fn trader_risk(&self, trader: AccountId, ctx: &PricingContext<'_>) -> Result<PortfolioRisk, SymbolError> {
        let mut total = PortfolioRisk::default();
        for state in self.trader_symbols(trader) {
            let quote = state.quote(ctx)?;
            let index = state.preview_funding_index(&quote, ctx.now);
            if let Some(risk) = state.position_risk(trader, &quote, index) {
                total.add(&risk, state.symbol.liquidation_reward_ratio());
            }
        }
        Ok(total)
    }

    // 3.5: what the pool is exposed to, symbol by symbol
    pub fn exposure(&self, ctx: &PricingContext<'_>) -> Result<PoolExposure, SymbolError> {
        let mut exposure = PoolExposure::default();
        for state in self.symbols.values().filter(|s| s.has_positions()) {
            let quote = state.quote(ctx)?;
            let index = state.preview_funding_index(&quote, ctx.now);
            let entry = SymbolExposure {
                symbol: state.name().clone(),
                net_volume: state.net_volume,
                net_notional: state.net_notional(&quote),
                traders_unrealized_pnl: state.traders_unrealized_pnl(&quote, index),
            };
            exposure.total_net_notional = exposure.total_net_notional.add(entry.net_notional);
            exposure.traders_unrealized_pnl = exposure.traders_unrealized_pnl.add(entry.traders_unrealized_pnl);
            exposure.symbols.push(entry);
        }
        Ok(exposure)
    }

    pub fn funding_index(&self, symbol: &SymbolId) -> Result<Decimal, SymbolError> {
        Ok(self.get(symbol)?.cumulative_funding_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{OracleManager, OracleSnapshot};
    use crate::symbol::{FuturesParams, FuturesSymbol, OptionParams, OptionSymbol};
    use rust_decimal_macros::dec;

    fn manager() -> SymbolManager {
        let mut manager = SymbolManager::new();
        manager.add_symbol(FuturesSymbol::btc_usd().into(), Timestamp::from_secs(0)).unwrap();
        manager
            .add_symbol(
                FuturesSymbol::new("ETHUSD", FuturesParams::eth_usd()).into(),
                Timestamp::from_secs(0),
            )
            .unwrap();
        manager
            .add_symbol(
                OptionSymbol::new("BTCUSD-60000-C", OptionParams::btc_call(dec!(60000))).into(),
                Timestamp::from_secs(0),
            )
            .unwrap();
        manager
    }

    fn oracle_at(btc: Decimal, eth: Decimal, ts: i64) -> OracleSnapshot {
        let mut oracle = OracleManager::new();
        let at = Timestamp::from_secs(ts);
        oracle.set_value("BTCUSD", btc, at);
        oracle.set_value("ETHUSD", eth, at);
        oracle.set_value("VOL-BTCUSD", dec!(0.9), at);
        OracleSnapshot::capture(&oracle, ["BTCUSD", "ETHUSD", "VOL-BTCUSD"], at, 60).unwrap()
    }

    fn liquidity() -> Quote {
        Quote::new(dec!(1_000_000))
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let mut manager = manager();
        let result = manager.add_symbol(FuturesSymbol::btc_usd().into(), Timestamp::from_secs(0));
        assert_eq!(result, Err(SymbolError::DuplicateSymbol(SymbolId::new("BTCUSD"))));
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_invalid_symbol_rejected() {
        let mut manager = SymbolManager::new();
        let mut params = FuturesParams::btc_usd();
        params.fee_rate = dec!(2);
        let result = manager.add_symbol(FuturesSymbol::new("BAD", params).into(), Timestamp::from_secs(0));
        assert!(matches!(result, Err(SymbolError::Config(_))));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_unknown_symbol() {
        let mut manager = manager();
        let oracle = oracle_at(dec!(50000), dec!(4000), 0);
        let ctx = PricingContext::new(&oracle, Timestamp::from_secs(0), liquidity());
        let result = manager.trade(AccountId(1), &SymbolId::new("DOGEUSD"), SignedSize::new(dec!(1)), &ctx);
        assert!(matches!(result, Err(SymbolError::UnknownSymbol(_))));
    }

    #[test]
    fn test_feed_sets() {
        let mut manager = manager();
        assert_eq!(manager.all_feeds().len(), 3);

        let oracle = oracle_at(dec!(50000), dec!(4000), 0);
        let ctx = PricingContext::new(&oracle, Timestamp::from_secs(0), liquidity());
        manager
            .trade(AccountId(1), &SymbolId::new("ETHUSD"), SignedSize::new(dec!(1)), &ctx)
            .unwrap();

        let feeds = manager.trader_feeds(AccountId(1), None).unwrap();
        assert_eq!(feeds.into_iter().collect::<Vec<_>>(), vec!["ETHUSD".to_string()]);

        let with_option = manager
            .trader_feeds(AccountId(1), Some(&SymbolId::new("BTCUSD-60000-C")))
            .unwrap();
        assert_eq!(with_option.len(), 3);
    }

    #[test]
    fn test_other_symbols_accrue_only_when_forced() {
        let mut manager = manager();
        let trader = AccountId(1);
        let btc = SymbolId::new("BTCUSD");
        let eth = SymbolId::new("ETHUSD");

        let t0 = oracle_at(dec!(50000), dec!(4000), 0);
        let ctx0 = PricingContext::new(&t0, Timestamp::from_secs(0), liquidity());
        manager.trade(trader, &btc, SignedSize::new(dec!(1)), &ctx0).unwrap();
        manager.trade(trader, &eth, SignedSize::new(dec!(1)), &ctx0).unwrap();

        // ten minutes, small move: only the traded symbol accrues
        let t1 = oracle_at(dec!(50100), dec!(4010), 600);
        let ctx1 = PricingContext::new(&t1, Timestamp::from_secs(600), liquidity());
        let accrued = manager
            .settle_symbols(&ctx1, AccrualScope::Trader { trader, traded: Some(&btc) })
            .unwrap();
        assert_eq!(accrued, vec![btc.clone()]);

        // ETH jumps 5%: forced
        let t2 = oracle_at(dec!(50100), dec!(4200), 660);
        let ctx2 = PricingContext::new(&t2, Timestamp::from_secs(660), liquidity());
        let accrued = manager
            .settle_symbols(&ctx2, AccrualScope::Trader { trader, traded: Some(&btc) })
            .unwrap();
        assert_eq!(accrued, vec![btc.clone(), eth.clone()]);

        let all = manager.settle_symbols(&ctx2, AccrualScope::All).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_trader_risk_sums_positions() {
        let mut manager = manager();
        let oracle = oracle_at(dec!(50000), dec!(4000), 0);
        let ctx = PricingContext::new(&oracle, Timestamp::from_secs(0), liquidity());
        manager
            .trade(AccountId(1), &SymbolId::new("BTCUSD"), SignedSize::new(dec!(1)), &ctx)
            .unwrap();
        manager
            .trade(AccountId(1), &SymbolId::new("ETHUSD"), SignedSize::new(dec!(-5)), &ctx)
            .unwrap();

        let risk = manager.trader_risk(AccountId(1), &ctx).unwrap();
        assert_eq!(risk.notional.value(), dec!(70000));
        assert_eq!(risk.initial_margin.value(), dec!(7000));
        assert_eq!(risk.maintenance_margin.value(), dec!(3500));
        assert_eq!(risk.unrealized_pnl, Quote::zero());
        assert_eq!(risk.reward_ratio(), dec!(0.5));
    }

    #[test]
    fn test_exposure_nets_traders() {
        let mut manager = manager();
        let btc = SymbolId::new("BTCUSD");
        let t0 = oracle_at(dec!(50000), dec!(4000), 0);
        let ctx0 = PricingContext::new(&t0, Timestamp::from_secs(0), liquidity());
        manager.trade(AccountId(1), &btc, SignedSize::new(dec!(3)), &ctx0).unwrap();
        manager.trade(AccountId(2), &btc, SignedSize::new(dec!(-1)), &ctx0).unwrap();

        let t1 = oracle_at(dec!(51000), dec!(4000), 0);
        let ctx1 = PricingContext::new(&t1, Timestamp::from_secs(0), liquidity());
        let exposure = manager.exposure(&ctx1).unwrap();

        assert_eq!(exposure.symbols.len(), 1);
        assert_eq!(exposure.total_net_notional.value(), dec!(102000));
        // +3000 for the long, -1000 for the short
        assert_eq!(exposure.traders_unrealized_pnl.value(), dec!(2000));
    }

    #[test]
    fn test_close_all_flattens_trader() {
        let mut manager = manager();
        let oracle = oracle_at(dec!(50000), dec!(4000), 0);
        let ctx = PricingContext::new(&oracle, Timestamp::from_secs(0), liquidity());
        manager
            .trade(AccountId(1), &SymbolId::new("BTCUSD"), SignedSize::new(dec!(1)), &ctx)
            .unwrap();
        manager
            .trade(AccountId(1), &SymbolId::new("BTCUSD-60000-C"), SignedSize::new(dec!(2)), &ctx)
            .unwrap();

        let closed = manager.close_all(AccountId(1), &ctx).unwrap();
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|s| s.new_volume.is_zero() && s.fee == Quote::zero()));
        assert!(!manager.has_positions(AccountId(1)));
    }

    #[test]
    fn test_status_change() {
        let mut manager = manager();
        let btc = SymbolId::new("BTCUSD");
        let previous = manager.set_status(&btc, SymbolStatus::Halted).unwrap();
        assert_eq!(previous, SymbolStatus::Active);
        assert_eq!(manager.get(&btc).unwrap().status, SymbolStatus::Halted);
    }
}
