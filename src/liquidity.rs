// 6.0 liquidity.rs: the shared pool. LPs own it through shares, and it is the
// counterparty to every trader. book NAV = total_liquidity + cumulative_pool_pnl and
// only moves on deposits, redemptions and realized trader flows.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PoolConfig;
use crate::margin::margin_ratio;
use crate::symbol::TradeSettlement;
use crate::symbol_manager::PoolExposure;
use crate::types::{AccountId, Quote};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiquidityError {
    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: Decimal, held: Decimal },

    #[error("Pool has no positive net asset value ({nav}) to price shares against")]
    NoNetAssetValue { nav: Quote },

    #[error("Pool margin ratio {ratio} below required {required}")]
    BelowSolvencyFloor { ratio: Decimal, required: Decimal },
}

/// Where the pool stands against its open exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSolvency {
    pub equity: Quote,
    pub net_notional: Quote,
    pub ratio: Decimal,
    pub required: Decimal,
}

impl PoolSolvency {
    pub fn is_solvent(&self) -> bool {
        self.ratio >= self.required
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidityPool {
    // LP principal, in base units
    pub total_liquidity: Quote,
    pub share_supply: Decimal,
    // everything the pool has won or lost against traders, fees included
    pub cumulative_pool_pnl: Quote,
    // protocol's cut of trading fees, outside NAV until collected
    pub protocol_fee_accrued: Quote,
    shares: BTreeMap<AccountId, Decimal>,
}

impl LiquidityPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nav(&self) -> Quote {
        self.total_liquidity.add(self.cumulative_pool_pnl)
    }

    pub fn nav_per_share(&self) -> Option<Decimal> {
        if self.share_supply.is_zero() {
            return None;
        }
        Some(self.nav().value() / self.share_supply)
    }

    pub fn shares_of(&self, lp: AccountId) -> Decimal {
        self.shares.get(&lp).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, &Decimal)> {
        self.shares.iter()
    }

    // 6.1: first deposit (or an emptied pool) mints 1:1
    pub fn shares_for_deposit(&self, amount: Quote) -> Result<Decimal, LiquidityError> {
        if self.share_supply.is_zero() {
            return Ok(amount.value());
        }
        let nav = self.nav();
        if !nav.is_positive() {
            return Err(LiquidityError::NoNetAssetValue { nav });
        }
        Ok(amount.value() * self.share_supply / nav.value())
    }

    pub fn redemption_value(&self, shares: Decimal) -> Quote {
        if self.share_supply.is_zero() {
            return Quote::zero();
        }
        self.nav().mul(shares / self.share_supply)
    }

    pub fn deposit(&mut self, lp: AccountId, amount: Quote) -> Result<Decimal, LiquidityError> {
        let minted = self.shares_for_deposit(amount)?;
        self.total_liquidity = self.total_liquidity.add(amount);
        self.share_supply += minted;
        *self.shares.entry(lp).or_insert(Decimal::ZERO) += minted;
        Ok(minted)
    }

    pub fn check_shares(&self, lp: AccountId, shares: Decimal) -> Result<(), LiquidityError> {
        let held = self.shares_of(lp);
        if shares > held {
            return Err(LiquidityError::InsufficientShares {
                requested: shares,
                held,
            });
        }
        Ok(())
    }

    /// Burns `shares` and takes their slice of principal and pnl out of the
    /// book. Returns the value removed.
    pub fn redeem(&mut self, lp: AccountId, shares: Decimal) -> Result<Quote, LiquidityError> {
        self.check_shares(lp, shares)?;
        if shares.is_zero() {
            return Ok(Quote::zero());
        }

        let fraction = shares / self.share_supply;
        let value = self.nav().mul(fraction);

        self.total_liquidity = self.total_liquidity.sub(self.total_liquidity.mul(fraction));
        self.cumulative_pool_pnl = self.cumulative_pool_pnl.sub(self.cumulative_pool_pnl.mul(fraction));
        self.share_supply -= shares;

        let remaining = self.shares_of(lp) - shares;
        if remaining.is_zero() {
            self.shares.remove(&lp);
        } else {
            self.shares.insert(lp, remaining);
        }

        // last holder out takes the rounding dust with them
        if self.share_supply.is_zero() {
            self.total_liquidity = Quote::zero();
            self.cumulative_pool_pnl = Quote::zero();
        }

        Ok(value)
    }

    // 6.2: pool side of a trade. the pool takes the opposite of the trader's pnl
    // and funding, and the fee minus the protocol cut
    pub fn book_settlement(&mut self, settlement: &TradeSettlement, protocol_fee_collect_ratio: Decimal) {
        let protocol_cut = settlement.fee.mul(protocol_fee_collect_ratio);
        let pool_take = settlement
            .funding
            .add(settlement.fee.sub(protocol_cut))
            .sub(settlement.realized_pnl);

        self.cumulative_pool_pnl = self.cumulative_pool_pnl.add(pool_take);
        self.protocol_fee_accrued = self.protocol_fee_accrued.add(protocol_cut);
    }

    // liquidation residual or written-off trader debt, either sign
    pub fn absorb(&mut self, residual: Quote) {
        self.cumulative_pool_pnl = self.cumulative_pool_pnl.add(residual);
    }

    // books `released` of the accrued protocol cut as paid out; the rest stays accrued
    pub fn collect_protocol_fee(&mut self, released: Quote) -> Quote {
        let collected = released.max(Quote::zero()).min(self.protocol_fee_accrued);
        self.protocol_fee_accrued = self.protocol_fee_accrued.sub(collected);
        collected
    }

    // 6.3: solvency guard. mark-to-market equity against net exposure, plus an
    // absolute floor while anything is open
    pub fn solvency(&self, exposure: &PoolExposure, config: &PoolConfig) -> PoolSolvency {
        let equity = self.nav().sub(exposure.traders_unrealized_pnl);
        let net_notional = exposure.total_net_notional;
        let required = if net_notional.is_positive() {
            config
                .min_pool_margin_ratio
                .max(config.min_liquidity_requirement.value() / net_notional.value())
        } else {
            Decimal::ZERO
        };

        PoolSolvency {
            equity,
            net_notional,
            ratio: margin_ratio(equity, net_notional),
            required,
        }
    }

    pub fn check_solvency(&self, exposure: &PoolExposure, config: &PoolConfig) -> Result<PoolSolvency, LiquidityError> {
        let solvency = self.solvency(exposure, config);
        if !solvency.is_solvent() {
            return Err(LiquidityError::BelowSolvencyFloor {
                ratio: solvency.ratio,
                required: solvency.required,
            });
        }
        Ok(solvency)
    }
}
