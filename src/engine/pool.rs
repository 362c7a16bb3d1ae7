//! LP entry and exit.

use super::core::Engine;
use super::results::{EngineError, LiquidityResult};
use crate::events::{EventPayload, LiquidityAddedEvent, LiquidityRemovedEvent};
use crate::oracle::OracleFeed;
use crate::swapper::Swapper;
use crate::symbol::PricingContext;
use crate::symbol_manager::AccrualScope;
use crate::types::{AccountId, Quote};
use crate::vault::Vault;
use rust_decimal::Decimal;

impl<O: OracleFeed, V: Vault, S: Swapper> Engine<O, V, S> {
    /// Deposits base liquidity and mints shares at the current NAV per share.
    pub fn add_liquidity(&mut self, provider: AccountId, amount: Quote) -> Result<LiquidityResult, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount {
                amount: amount.value(),
                reason: "liquidity deposit must be positive".to_string(),
            });
        }

        let feeds = self.ledger.symbols.all_feeds();
        let oracle = self.snapshot(feeds.iter().map(String::as_str))?;
        let mut draft = self.ledger.clone();
        let ctx = PricingContext::new(&oracle, self.current_time, draft.pool.nav());
        draft.symbols.settle_symbols(&ctx, AccrualScope::All)?;

        let minted = draft.pool.deposit(provider, amount)?;
        self.vault.deposit(&self.config.pool.base_asset, amount.value())?;

        let nav_after = draft.pool.nav();
        let share_supply_after = draft.pool.share_supply;
        self.commit(draft);

        tracing::info!(?provider, %amount, %minted, nav = %nav_after, "liquidity added");
        self.emit_event(EventPayload::LiquidityAdded(LiquidityAddedEvent {
            provider,
            amount,
            shares_minted: minted,
            nav_after,
        }));

        Ok(LiquidityResult {
            provider,
            shares: minted,
            value: amount,
            shortfall: Quote::zero(),
            nav_after,
            share_supply_after,
        })
    }

    /// Burns shares for their slice of NAV, provided the pool stays above its
    /// solvency floors afterwards. When the vault releases less than the
    /// redemption value only the matching fraction of shares is burned.
    pub fn remove_liquidity(&mut self, provider: AccountId, shares: Decimal) -> Result<LiquidityResult, EngineError> {
        if shares <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount {
                amount: shares,
                reason: "share amount must be positive".to_string(),
            });
        }
        self.ledger.pool.check_shares(provider, shares)?;

        let feeds = self.ledger.symbols.all_feeds();
        let oracle = self.snapshot(feeds.iter().map(String::as_str))?;
        let mut accrued = self.ledger.clone();
        let ctx = PricingContext::new(&oracle, self.current_time, accrued.pool.nav());
        accrued.symbols.settle_symbols(&ctx, AccrualScope::All)?;

        let value = accrued.pool.redemption_value(shares);
        if !value.is_positive() {
            return Err(EngineError::InsufficientPoolLiquidity {
                ratio: Decimal::ZERO,
                required: Decimal::ZERO,
            });
        }

        let mut draft = accrued.clone();
        draft.pool.redeem(provider, shares)?;
        let exposure = draft.symbols.exposure(&ctx)?;
        if let Err(err) = draft.pool.check_solvency(&exposure, &self.config.pool) {
            tracing::warn!(?provider, %shares, error = %err, "liquidity removal rejected");
            return Err(err.into());
        }

        let released = Quote::new(self.vault.withdraw(&self.config.pool.base_asset, value.value())?);
        let mut burned = shares;
        if released < value {
            // less out means fewer shares burned, which only helps solvency
            burned = shares * released.value() / value.value();
            draft = accrued;
            draft.pool.redeem(provider, burned)?;
        }

        let nav_after = draft.pool.nav();
        let share_supply_after = draft.pool.share_supply;
        self.commit(draft);

        tracing::info!(?provider, shares = %burned, value = %released, nav = %nav_after, "liquidity removed");
        self.emit_event(EventPayload::LiquidityRemoved(LiquidityRemovedEvent {
            provider,
            shares_burned: burned,
            value,
            released,
            nav_after,
        }));

        Ok(LiquidityResult {
            provider,
            shares: burned,
            value: released,
            shortfall: value.sub(released),
            nav_after,
            share_supply_after,
        })
    }
}
