// 10.0 vault.rs: where pooled collateral actually sits. in production this is a lending
// market; here the in-memory `LendingVault` models one, including the case where
// the market is short of cash and a withdrawal comes back partial.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::AssetId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid vault amount {0}")]
    InvalidAmount(Decimal),

    #[error("Vault market for {0} is paused")]
    Paused(AssetId),
}

/// Custody for every asset the pool holds.
pub trait Vault {
    fn deposit(&mut self, asset: &AssetId, amount: Decimal) -> Result<(), VaultError>;
    /// Returns what was actually released, which may be less than requested.
    fn withdraw(&mut self, asset: &AssetId, amount: Decimal) -> Result<Decimal, VaultError>;
    fn balance(&self, asset: &AssetId) -> Decimal;

    /// Whether a deposit of `asset` would be taken right now.
    fn accepts_deposits(&self, _asset: &AssetId) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Market {
    supplied: Decimal,
    // cash the lending market can hand back right now; None = unconstrained
    available_cash: Option<Decimal>,
    paused: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LendingVault {
    markets: BTreeMap<AssetId, Market>,
}

impl LendingVault {
    pub fn new() -> Self {
        Self::default()
    }

    // caps how much can come out of the asset's market
    pub fn set_available_cash(&mut self, asset: &AssetId, cash: Option<Decimal>) {
        self.markets.entry(asset.clone()).or_default().available_cash = cash;
    }

    pub fn set_paused(&mut self, asset: &AssetId, paused: bool) {
        self.markets.entry(asset.clone()).or_default().paused = paused;
    }

    fn open_market(&mut self, asset: &AssetId) -> Result<&mut Market, VaultError> {
        let market = self.markets.entry(asset.clone()).or_default();
        if market.paused {
            return Err(VaultError::Paused(asset.clone()));
        }
        Ok(market)
    }
}

impl Vault for LendingVault {
    fn deposit(&mut self, asset: &AssetId, amount: Decimal) -> Result<(), VaultError> {
        if amount <= Decimal::ZERO {
            return Err(VaultError::InvalidAmount(amount));
        }
        let market = self.open_market(asset)?;
        market.supplied += amount;
        if let Some(cash) = market.available_cash.as_mut() {
            *cash += amount;
        }
        Ok(())
    }

    fn withdraw(&mut self, asset: &AssetId, amount: Decimal) -> Result<Decimal, VaultError> {
        if amount < Decimal::ZERO {
            return Err(VaultError::InvalidAmount(amount));
        }
        let market = self.open_market(asset)?;
        let liquid = market
            .available_cash
            .map_or(market.supplied, |cash| cash.min(market.supplied));
        let actual = amount.min(liquid).max(Decimal::ZERO);

        market.supplied -= actual;
        if let Some(cash) = market.available_cash.as_mut() {
            *cash -= actual;
        }
        if actual < amount {
            tracing::warn!(%asset, requested = %amount, released = %actual, "partial vault withdrawal");
        }
        Ok(actual)
    }

    fn balance(&self, asset: &AssetId) -> Decimal {
        self.markets.get(asset).map_or(Decimal::ZERO, |m| m.supplied)
    }

    fn accepts_deposits(&self, asset: &AssetId) -> bool {
        self.markets.get(asset).map_or(true, |m| !m.paused)
    }
}
