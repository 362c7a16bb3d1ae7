//! Liquidation execution.

use super::core::Engine;
use super::results::{EngineError, LiquidationResult};
use crate::account::MarginAccount;
use crate::events::{EventPayload, LiquidatedEvent};
use crate::liquidation::calculate_reward;
use crate::oracle::OracleFeed;
use crate::swapper::Swapper;
use crate::symbol::PricingContext;
use crate::symbol_manager::AccrualScope;
use crate::types::{AccountId, AssetId, Quote};
use crate::vault::{Vault, VaultError};
use rust_decimal::Decimal;

// one non-base holding on its way to base
struct Conversion {
    asset: AssetId,
    amount: Decimal,
    min_received: Decimal,
}

impl<O: OracleFeed, V: Vault, S: Swapper> Engine<O, V, S> {
    /// Closes every position of an under-maintenance trader at mark, sells its
    /// non-base collateral, pays the liquidator and hands the rest (or the
    /// shortfall) to the pool. The trader's account is removed. A flat account
    /// with negative equity goes through the same path.
    pub fn liquidate(&mut self, liquidator: AccountId, trader: AccountId) -> Result<LiquidationResult, EngineError> {
        let feeds = self.ledger.trader_feeds(trader, None, &self.config)?;
        let oracle = self.snapshot(feeds.iter().map(String::as_str))?;

        let mut draft = self.ledger.clone();
        let ctx = PricingContext::new(&oracle, self.current_time, draft.pool.nav());
        draft.symbols.settle_symbols(&ctx, AccrualScope::Trader { trader, traded: None })?;

        let margin = draft.margin_snapshot(trader, &self.config, &ctx)?;
        // a flat account is liquidatable only while it is in debt
        if margin.covers_maintenance() {
            return Err(EngineError::NotLiquidatable {
                trader,
                ratio: margin.margin_ratio(),
                required: margin.maintenance_ratio(),
            });
        }
        let reward_ratio = margin.risk.reward_ratio();

        // 8.4.1: close everything at mark, funding settled, no fee
        let closed = draft.symbols.close_all(trader, &ctx)?;
        for settlement in &closed {
            draft.book(trader, settlement, &self.config, self.current_time);
        }

        // 8.4.2: quote every sale before anything leaves the vault
        let base = self.config.pool.base_asset.clone();
        let mut account = draft
            .accounts
            .remove(&trader)
            .unwrap_or_else(|| MarginAccount::new(trader, self.current_time));
        let mut conversions = Vec::new();
        for (asset, amount) in account.balances() {
            if *asset == base || *amount <= Decimal::ZERO {
                continue;
            }
            let collateral = self
                .config
                .pool
                .collateral(asset)
                .ok_or_else(|| EngineError::InvalidCollateral(asset.clone()))?;
            let oracle_value = amount * oracle.value(&collateral.price_feed)?;
            let min_received = oracle_value * (Decimal::ONE - self.config.pool.max_swap_slippage);
            let quoted = self.swapper.quote(asset, &base, *amount)?;
            if quoted < min_received {
                tracing::warn!(?trader, %asset, %quoted, %min_received, "liquidation swap would exceed slippage");
                return Err(EngineError::SlippageExceeded {
                    received: quoted,
                    min_received,
                });
            }
            conversions.push(Conversion {
                asset: asset.clone(),
                amount: *amount,
                min_received,
            });
        }

        let converted = self.convert_collateral(trader, &conversions, &base)?;
        for (asset, _, received) in &converted {
            account.take(asset);
            account.credit(&base, *received);
        }

        // 8.4.3: reward from what is left, residual to the pool
        let remaining = Quote::new(account.balance(&base));
        let reward = calculate_reward(
            remaining,
            reward_ratio,
            self.config.pool.min_liquidation_reward,
            self.config.pool.max_liquidation_reward,
        );
        let pool_residual = remaining.sub(reward);
        draft.pool.absorb(pool_residual);
        if reward.is_positive() {
            let now = self.current_time;
            draft
                .accounts
                .entry(liquidator)
                .or_insert_with(|| MarginAccount::new(liquidator, now))
                .credit(&base, reward.value());
        }

        self.commit(draft);
        self.liquidated.mark(trader);

        tracing::info!(
            ?trader,
            ?liquidator,
            positions = closed.len(),
            %remaining,
            %reward,
            residual = %pool_residual,
            "account liquidated"
        );
        self.emit_event(EventPayload::Liquidated(LiquidatedEvent {
            trader,
            liquidator,
            closed: closed.clone(),
            remaining_margin: remaining,
            reward,
            pool_residual,
        }));

        Ok(LiquidationResult {
            trader,
            liquidator,
            closed,
            converted,
            remaining_margin: remaining,
            reward,
            pool_residual,
        })
    }

    // pull every holding out of the vault first so a short market fails before any
    // swap runs, then sell each one. base proceeds go straight back into the vault
    fn convert_collateral(
        &mut self,
        trader: AccountId,
        conversions: &[Conversion],
        base: &AssetId,
    ) -> Result<Vec<(AssetId, Decimal, Decimal)>, EngineError> {
        if !conversions.is_empty() && !self.vault.accepts_deposits(base) {
            return Err(VaultError::Paused(base.clone()).into());
        }

        let mut withdrawn: Vec<(&AssetId, Decimal)> = Vec::with_capacity(conversions.len());
        for conversion in conversions {
            let released = match self.vault.withdraw(&conversion.asset, conversion.amount) {
                Ok(released) => released,
                Err(err) => {
                    self.restore_all(&withdrawn);
                    return Err(err.into());
                }
            };
            withdrawn.push((&conversion.asset, released));
            if released < conversion.amount {
                self.restore_all(&withdrawn);
                return Err(EngineError::CollateralUnavailable {
                    asset: conversion.asset.clone(),
                    requested: conversion.amount,
                    released,
                });
            }
        }

        let mut converted = Vec::with_capacity(conversions.len());
        for (index, conversion) in conversions.iter().enumerate() {
            let swapped = self
                .swapper
                .swap(&conversion.asset, base, conversion.amount, conversion.min_received);
            let received = match swapped {
                Ok(received) => received,
                Err(err) => {
                    tracing::warn!(?trader, asset = %conversion.asset, error = %err, "swap failed mid-liquidation");
                    self.restore_all(&withdrawn[index..]);
                    self.keep_sold(trader, &converted, base);
                    return Err(err.into());
                }
            };
            if let Err(err) = self.vault.deposit(base, received) {
                tracing::error!(?trader, asset = %conversion.asset, %received, error = %err, "swap proceeds not deposited");
                self.restore_all(&withdrawn[index + 1..]);
                self.keep_sold(trader, &converted, base);
                return Err(err.into());
            }
            converted.push((conversion.asset.clone(), conversion.amount, received));
        }
        Ok(converted)
    }

    // legs sold before a failure already sit in the vault as base. the live
    // account follows them so ledger and vault still agree
    fn keep_sold(&mut self, trader: AccountId, sold: &[(AssetId, Decimal, Decimal)], base: &AssetId) {
        if sold.is_empty() {
            return;
        }
        let Some(account) = self.ledger.accounts.get_mut(&trader) else {
            return;
        };
        for (asset, amount, received) in sold {
            if let Err(err) = account.debit(asset, *amount) {
                tracing::error!(?trader, %asset, error = %err, "sold collateral missing from account");
                continue;
            }
            account.credit(base, *received);
        }
        tracing::warn!(?trader, legs = sold.len(), "partial collateral sale kept as base");
    }

    fn restore_all(&mut self, withdrawn: &[(&AssetId, Decimal)]) {
        for (asset, amount) in withdrawn {
            self.restore(asset, *amount);
        }
    }

    fn restore(&mut self, asset: &AssetId, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        if let Err(err) = self.vault.deposit(asset, amount) {
            tracing::error!(%asset, %amount, error = %err, "could not return collateral to vault");
        }
    }
}
