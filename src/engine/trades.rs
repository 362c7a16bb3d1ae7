//! Trade execution and expiry settlement.

use super::core::Engine;
use super::results::{EngineError, TradeResult};
use crate::events::{EventPayload, ExpirySettledEvent, TradedEvent};
use crate::oracle::OracleFeed;
use crate::swapper::Swapper;
use crate::symbol::{PricingContext, TradeSettlement};
use crate::symbol_manager::AccrualScope;
use crate::types::{AccountId, SignedSize, SymbolId};
use crate::vault::Vault;

impl<O: OracleFeed, V: Vault, S: Swapper> Engine<O, V, S> {
    /// Changes the trader's position on `symbol` by `volume` (zero just settles
    /// funding). Opening or growing exposure must leave initial margin covered;
    /// anything else must leave maintenance margin covered. A trade that grows
    /// the pool's net exposure on the symbol must also keep the pool solvent.
    pub fn trade(&mut self, trader: AccountId, symbol: &SymbolId, volume: SignedSize) -> Result<TradeResult, EngineError> {
        let pool_net = self.ledger.symbols.get(symbol)?.net_volume;
        let grows_pool = pool_net.is_increased_by(pool_net.add(volume.value()));

        let mut feeds = self.ledger.trader_feeds(trader, Some(symbol), &self.config)?;
        if grows_pool {
            feeds.extend(self.ledger.symbols.all_feeds());
        }
        let oracle = self.snapshot(feeds.iter().map(String::as_str))?;

        let mut draft = self.ledger.clone();
        let ctx = PricingContext::new(&oracle, self.current_time, draft.pool.nav());
        draft.symbols.settle_symbols(
            &ctx,
            AccrualScope::Trader {
                trader,
                traded: Some(symbol),
            },
        )?;

        let settlement = draft.symbols.trade(trader, symbol, volume, &ctx)?;
        draft.book(trader, &settlement, &self.config, self.current_time);

        let margin = draft.margin_snapshot(trader, &self.config, &ctx)?;
        let (covered, required) = if settlement.increased_exposure() {
            (margin.covers_initial(), margin.initial_ratio())
        } else {
            (margin.covers_maintenance(), margin.maintenance_ratio())
        };
        if !covered {
            tracing::warn!(
                ?trader,
                %symbol,
                %volume,
                ratio = %margin.margin_ratio(),
                %required,
                "trade rejected by margin check"
            );
            return Err(EngineError::MarginCheckFailed {
                ratio: margin.margin_ratio(),
                required,
            });
        }

        if grows_pool {
            let exposure = draft.symbols.exposure(&ctx)?;
            if let Err(err) = draft.pool.check_solvency(&exposure, &self.config.pool) {
                tracing::warn!(?trader, %symbol, %volume, error = %err, "trade rejected by pool solvency");
                return Err(err.into());
            }
        }

        draft.prune_account(trader);
        self.commit(draft);

        tracing::info!(
            ?trader,
            %symbol,
            %volume,
            price = %settlement.trade_price,
            pnl = %settlement.realized_pnl,
            funding = %settlement.funding,
            fee = %settlement.fee,
            "trade settled"
        );
        self.emit_event(EventPayload::Traded(TradedEvent {
            trader,
            volume,
            settlement: settlement.clone(),
            margin_ratio_after: margin.margin_ratio(),
        }));

        Ok(TradeResult {
            trader,
            settlement,
            equity_after: margin.equity(),
            margin_ratio_after: margin.margin_ratio(),
        })
    }

    /// Closes a trader's position on an expired dated option at intrinsic
    /// value. No fee and no margin check: it can only reduce risk. When the
    /// loss leaves a flat account owing base and holding nothing else, the
    /// pool writes the debt off; debt backed by other collateral is left for
    /// `liquidate`.
    pub fn settle_expired(&mut self, trader: AccountId, symbol: &SymbolId) -> Result<TradeSettlement, EngineError> {
        let feeds = self.ledger.trader_feeds(trader, Some(symbol), &self.config)?;
        let oracle = self.snapshot(feeds.iter().map(String::as_str))?;

        let mut draft = self.ledger.clone();
        let ctx = PricingContext::new(&oracle, self.current_time, draft.pool.nav());
        let settlement = draft.symbols.settle_expired(trader, symbol, &ctx)?;
        draft.book(trader, &settlement, &self.config, self.current_time);
        let written_off = draft.write_off_debt(trader, &self.config);
        draft.prune_account(trader);
        self.commit(draft);

        if written_off.is_negative() {
            tracing::warn!(?trader, %symbol, debt = %written_off, "expiry left unpaid debt, absorbed by pool");
        }

        tracing::info!(
            ?trader,
            %symbol,
            price = %settlement.trade_price,
            pnl = %settlement.realized_pnl,
            "expired position settled"
        );
        self.emit_event(EventPayload::ExpirySettled(ExpirySettledEvent {
            trader,
            settlement: settlement.clone(),
            written_off,
        }));
        Ok(settlement)
    }
}
