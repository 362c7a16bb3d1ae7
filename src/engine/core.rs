// 8.0 engine/core.rs: main engine. holds the ledger, the external collaborators and
// the event log. every operation works on a cloned draft of the ledger and swaps it
// in only when everything passed.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::MarginAccount;
use crate::events::{Event, EventLog, EventPayload, ProtocolFeeCollectedEvent, SymbolAddedEvent, SymbolStatusChangedEvent};
use crate::liquidation::LiquidationRegistry;
use crate::liquidity::{LiquidityPool, PoolSolvency};
use crate::margin::MarginSnapshot;
use crate::oracle::{OracleFeed, OracleManager, OracleSnapshot};
use crate::swapper::{FixedRateSwapper, Swapper};
use crate::symbol::{Instrument, PricingContext, Symbol, SymbolStatus, TradeSettlement};
use crate::symbol_manager::SymbolManager;
use crate::types::{AccountId, Quote, SymbolId, Timestamp};
use crate::vault::{LendingVault, Vault};
use std::collections::{BTreeMap, BTreeSet};

/** 8.1: everything an operation may change. cloned into a draft, committed whole */
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub symbols: SymbolManager,
    pub pool: LiquidityPool,
    pub accounts: BTreeMap<AccountId, MarginAccount>,
}

impl Ledger {
    // pnl, funding and fee to the trader; the opposite to the pool and protocol
    pub(super) fn book(
        &mut self,
        trader: AccountId,
        settlement: &TradeSettlement,
        config: &EngineConfig,
        now: Timestamp,
    ) {
        self.accounts
            .entry(trader)
            .or_insert_with(|| MarginAccount::new(trader, now))
            .realize(&config.pool.base_asset, settlement.net_to_trader());
        self.pool
            .book_settlement(settlement, config.pool.protocol_fee_collect_ratio);
    }

    pub(super) fn margin_snapshot(
        &self,
        trader: AccountId,
        config: &EngineConfig,
        ctx: &PricingContext<'_>,
    ) -> Result<MarginSnapshot, EngineError> {
        let collateral = match self.accounts.get(&trader) {
            Some(account) => account.collateral_value(&config.pool, ctx.oracle)?,
            None => Quote::zero(),
        };
        let risk = self.symbols.trader_risk(trader, ctx)?;
        Ok(MarginSnapshot::new(collateral, risk))
    }

    // feeds for the trader's positions, an optional extra symbol, and held collateral
    pub(super) fn trader_feeds(
        &self,
        trader: AccountId,
        extra: Option<&SymbolId>,
        config: &EngineConfig,
    ) -> Result<BTreeSet<String>, EngineError> {
        let mut feeds = self.symbols.trader_feeds(trader, extra)?;
        if let Some(account) = self.accounts.get(&trader) {
            feeds.extend(account.collateral_feeds(&config.pool).into_iter().map(str::to_string));
        }
        Ok(feeds)
    }

    // a flat account holding nothing but a negative base balance has no way to
    // pay it back. the pool already booked the loss as income, so the debt comes
    // straight back out of pool pnl and the account is closed. returns the
    // amount written off (<= 0)
    pub(super) fn write_off_debt(&mut self, trader: AccountId, config: &EngineConfig) -> Quote {
        if self.symbols.has_positions(trader) {
            return Quote::zero();
        }
        let base = &config.pool.base_asset;
        let Some(account) = self.accounts.get(&trader) else {
            return Quote::zero();
        };
        let debt = Quote::new(account.balance(base));
        if !debt.is_negative() || account.balances().any(|(asset, _)| asset != base) {
            return Quote::zero();
        }
        self.accounts.remove(&trader);
        self.pool.absorb(debt);
        debt
    }

    // accounts go away once nothing is held and nothing is open
    pub(super) fn prune_account(&mut self, trader: AccountId) {
        let empty = self.accounts.get(&trader).is_some_and(|a| a.is_empty());
        if empty && !self.symbols.has_positions(trader) {
            self.accounts.remove(&trader);
        }
    }
}

/** 8.2: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<O = OracleManager, V = LendingVault, S = FixedRateSwapper> {
    pub(super) config: EngineConfig,
    pub(super) ledger: Ledger,
    pub(super) liquidated: LiquidationRegistry,
    pub(super) oracle: O,
    pub(super) vault: V,
    pub(super) swapper: S,
    pub(super) events: EventLog,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_collaborators(config, OracleManager::new(), LendingVault::new(), FixedRateSwapper::new())
    }
}

impl<O: OracleFeed, V: Vault, S: Swapper> Engine<O, V, S> {
    pub fn with_collaborators(config: EngineConfig, oracle: O, vault: V, swapper: S) -> Result<Self, EngineError> {
        config.validate()?;
        let events = EventLog::new(config.max_events);
        Ok(Self {
            config,
            ledger: Ledger::default(),
            liquidated: LiquidationRegistry::new(),
            oracle,
            vault,
            swapper,
            events,
            current_time: Timestamp::from_secs(0),
        })
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut V {
        &mut self.vault
    }

    pub fn swapper_mut(&mut self) -> &mut S {
        &mut self.swapper
    }

    pub fn pool(&self) -> &LiquidityPool {
        &self.ledger.pool
    }

    pub fn symbols(&self) -> &SymbolManager {
        &self.ledger.symbols
    }

    pub fn account(&self, trader: AccountId) -> Option<&MarginAccount> {
        self.ledger.accounts.get(&trader)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&AccountId, &MarginAccount)> {
        self.ledger.accounts.iter()
    }

    pub fn add_symbol(&mut self, symbol: impl Into<Symbol>) -> Result<SymbolId, EngineError> {
        let symbol = symbol.into();
        let name = symbol.name().clone();
        let kind = match &symbol {
            Symbol::Futures(_) => "futures",
            Symbol::Option(_) => "option",
        };
        self.ledger.symbols.add_symbol(symbol, self.current_time)?;

        tracing::info!(symbol = %name, kind, "symbol added");
        self.emit_event(EventPayload::SymbolAdded(SymbolAddedEvent {
            symbol: name.clone(),
            kind: kind.to_string(),
        }));
        Ok(name)
    }

    pub fn set_symbol_status(&mut self, symbol: &SymbolId, status: SymbolStatus) -> Result<SymbolStatus, EngineError> {
        let previous = self.ledger.symbols.set_status(symbol, status)?;
        if previous != status {
            tracing::info!(%symbol, ?previous, ?status, "symbol status changed");
            self.emit_event(EventPayload::SymbolStatusChanged(SymbolStatusChangedEvent {
                symbol: symbol.clone(),
                previous,
                status,
            }));
        }
        Ok(previous)
    }

    /// Moves the accrued protocol cut out of the vault. A short vault leaves
    /// the remainder accrued.
    pub fn collect_protocol_fee(&mut self) -> Result<Quote, EngineError> {
        let accrued = self.ledger.pool.protocol_fee_accrued;
        if !accrued.is_positive() {
            return Ok(Quote::zero());
        }
        let released = self.vault.withdraw(&self.config.pool.base_asset, accrued.value())?;
        let collected = self.ledger.pool.collect_protocol_fee(Quote::new(released));

        tracing::info!(amount = %collected, "protocol fee collected");
        self.emit_event(EventPayload::ProtocolFeeCollected(ProtocolFeeCollectedEvent {
            amount: collected,
        }));
        Ok(collected)
    }

    /// Read-only pool solvency at the current time, funding previewed.
    pub fn pool_solvency(&self) -> Result<PoolSolvency, EngineError> {
        let feeds = self.ledger.symbols.all_feeds();
        let oracle = self.snapshot(feeds.iter().map(String::as_str))?;
        let ctx = PricingContext::new(&oracle, self.current_time, self.ledger.pool.nav());
        let exposure = self.ledger.symbols.exposure(&ctx)?;
        Ok(self.ledger.pool.solvency(&exposure, &self.config.pool))
    }

    pub fn recent_events(&self, count: usize) -> Vec<&Event> {
        self.events.recent(count)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // one staleness-checked read of every feed the operation needs
    pub(super) fn snapshot<'a, I>(&self, feeds: I) -> Result<OracleSnapshot, EngineError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Ok(OracleSnapshot::capture(
            &self.oracle,
            feeds,
            self.current_time,
            self.config.oracle.max_staleness_secs,
        )?)
    }

    pub(super) fn commit(&mut self, draft: Ledger) {
        self.ledger = draft;
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        if self.config.verbose {
            tracing::debug!(kind = payload.kind(), ?payload, "event");
        }
        self.events.push(self.current_time, payload);
    }
}
