//! Trader collateral in and out, and read-only margin views.

use super::core::Engine;
use super::results::{EngineError, MarginResult};
use crate::account::MarginAccount;
use crate::events::{EventPayload, MarginAddedEvent, MarginRemovedEvent};
use crate::liquidation::{evaluate_state, LiquidationState};
use crate::margin::MarginSnapshot;
use crate::oracle::OracleFeed;
use crate::swapper::Swapper;
use crate::symbol::PricingContext;
use crate::symbol_manager::AccrualScope;
use crate::types::{AccountId, AssetId};
use crate::vault::Vault;
use rust_decimal::Decimal;

/// How collateral reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollateralTransfer {
    // native asset, attached to the call as value
    Native { value: Decimal },
    // token transfer; `amount` is what the caller declares, `transferred` what arrived
    Token {
        asset: AssetId,
        amount: Decimal,
        transferred: Decimal,
    },
}

impl<O: OracleFeed, V: Vault, S: Swapper> Engine<O, V, S> {
    pub fn add_margin(&mut self, trader: AccountId, transfer: CollateralTransfer) -> Result<MarginResult, EngineError> {
        let (asset, amount) = match transfer {
            CollateralTransfer::Native { value } => (self.config.pool.native_asset.clone(), value),
            CollateralTransfer::Token {
                asset,
                amount,
                transferred,
            } => {
                if asset == self.config.pool.native_asset {
                    return Err(EngineError::InvalidAmount {
                        amount,
                        reason: format!("{asset} arrives as attached value, not as a token"),
                    });
                }
                if amount != transferred {
                    return Err(EngineError::InvalidAmount {
                        amount,
                        reason: format!("declared amount differs from transferred {transferred}"),
                    });
                }
                (asset, amount)
            }
        };

        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount {
                amount,
                reason: "margin deposit must be positive".to_string(),
            });
        }
        if !self.config.pool.is_supported(&asset) {
            return Err(EngineError::InvalidCollateral(asset));
        }

        let mut draft = self.ledger.clone();
        let now = self.current_time;
        let account = draft
            .accounts
            .entry(trader)
            .or_insert_with(|| MarginAccount::new(trader, now));
        account.credit(&asset, amount);
        let balance_after = account.balance(&asset);

        self.vault.deposit(&asset, amount)?;
        self.commit(draft);
        let cleared_liquidation = self.liquidated.clear(trader);

        tracing::info!(?trader, %asset, %amount, "margin added");
        self.emit_event(EventPayload::MarginAdded(MarginAddedEvent {
            trader,
            asset: asset.clone(),
            amount,
            cleared_liquidation,
        }));

        Ok(MarginResult {
            trader,
            asset,
            requested: amount,
            amount,
            balance_after,
        })
    }

    /// Token path for callers that move `amount` exactly; native asset goes
    /// through the attached-value path.
    pub fn deposit_collateral(
        &mut self,
        trader: AccountId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<MarginResult, EngineError> {
        let transfer = if *asset == self.config.pool.native_asset {
            CollateralTransfer::Native { value: amount }
        } else {
            CollateralTransfer::Token {
                asset: asset.clone(),
                amount,
                transferred: amount,
            }
        };
        self.add_margin(trader, transfer)
    }

    /// Withdraws collateral as long as what is left still covers the initial
    /// margin of every open position.
    pub fn remove_margin(
        &mut self,
        trader: AccountId,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<MarginResult, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount {
                amount,
                reason: "margin withdrawal must be positive".to_string(),
            });
        }
        let available = self.account(trader).map(|a| a.balance(asset)).unwrap_or(Decimal::ZERO);
        if amount > available {
            return Err(EngineError::InsufficientBalance {
                asset: asset.clone(),
                requested: amount,
                available,
            });
        }

        let feeds = self.ledger.trader_feeds(trader, None, &self.config)?;
        let oracle = self.snapshot(feeds.iter().map(String::as_str))?;
        let mut draft = self.ledger.clone();
        let ctx = PricingContext::new(&oracle, self.current_time, draft.pool.nav());
        draft.symbols.settle_symbols(&ctx, AccrualScope::Trader { trader, traded: None })?;

        if let Some(account) = draft.accounts.get_mut(&trader) {
            account.debit(asset, amount)?;
        }
        let snapshot = draft.margin_snapshot(trader, &self.config, &ctx)?;
        if !snapshot.covers_initial() {
            tracing::warn!(
                ?trader,
                %asset,
                %amount,
                ratio = %snapshot.margin_ratio(),
                required = %snapshot.initial_ratio(),
                "margin removal rejected"
            );
            return Err(EngineError::InsufficientMargin {
                ratio: snapshot.margin_ratio(),
                required: snapshot.initial_ratio(),
            });
        }

        let released = self.vault.withdraw(asset, amount)?;
        if let Some(account) = draft.accounts.get_mut(&trader) {
            // whatever the vault kept stays on the account
            account.credit(asset, amount - released);
        }
        let balance_after = draft.accounts.get(&trader).map(|a| a.balance(asset)).unwrap_or(Decimal::ZERO);
        draft.prune_account(trader);
        self.commit(draft);

        tracing::info!(?trader, %asset, requested = %amount, %released, "margin removed");
        self.emit_event(EventPayload::MarginRemoved(MarginRemovedEvent {
            trader,
            asset: asset.clone(),
            requested: amount,
            released,
        }));

        Ok(MarginResult {
            trader,
            asset: asset.clone(),
            requested: amount,
            amount: released,
            balance_after,
        })
    }

    /// Current margin position with funding previewed, nothing written.
    pub fn margin_snapshot(&self, trader: AccountId) -> Result<MarginSnapshot, EngineError> {
        let feeds = self.ledger.trader_feeds(trader, None, &self.config)?;
        let oracle = self.snapshot(feeds.iter().map(String::as_str))?;
        let ctx = PricingContext::new(&oracle, self.current_time, self.ledger.pool.nav());
        self.ledger.margin_snapshot(trader, &self.config, &ctx)
    }

    pub fn liquidation_state(&self, trader: AccountId) -> Result<LiquidationState, EngineError> {
        let snapshot = self.margin_snapshot(trader)?;
        Ok(evaluate_state(&snapshot, self.liquidated.contains(trader)))
    }
}
