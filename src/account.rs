//! Trader margin accounts.
//!
//! One account per trader, holding a balance per collateral asset. The base
//! asset balance is signed and absorbs realized PnL, funding and fees; other
//! assets are plain non-negative holdings valued through the oracle with a
//! per-asset haircut. Margin is cross: every position shares the whole account.

use crate::config::PoolConfig;
use crate::oracle::{OracleError, OracleSnapshot};
use crate::types::{AccountId, AssetId, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginAccount {
    pub trader: AccountId,
    balances: BTreeMap<AssetId, Decimal>,
    pub realized_pnl: Quote,
    pub created_at: Timestamp,
}

impl MarginAccount {
    pub fn new(trader: AccountId, timestamp: Timestamp) -> Self {
        Self {
            trader,
            balances: BTreeMap::new(),
            realized_pnl: Quote::zero(),
            created_at: timestamp,
        }
    }

    pub fn balance(&self, asset: &AssetId) -> Decimal {
        self.balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn balances(&self) -> impl Iterator<Item = (&AssetId, &Decimal)> {
        self.balances.iter()
    }

    pub fn credit(&mut self, asset: &AssetId, amount: Decimal) {
        *self.balances.entry(asset.clone()).or_insert(Decimal::ZERO) += amount;
        self.prune(asset);
    }

    pub fn debit(&mut self, asset: &AssetId, amount: Decimal) -> Result<(), AccountError> {
        let available = self.balance(asset);
        if amount > available {
            return Err(AccountError::InsufficientBalance {
                asset: asset.clone(),
                requested: amount,
                available,
            });
        }
        self.credit(asset, -amount);
        Ok(())
    }

    // moves the asset's whole balance out, for collateral conversion
    pub fn take(&mut self, asset: &AssetId) -> Decimal {
        self.balances.remove(asset).unwrap_or(Decimal::ZERO)
    }

    // pnl, funding and fees land on the base balance, which may go negative
    pub fn realize(&mut self, base_asset: &AssetId, net: Quote) {
        self.credit(base_asset, net.value());
        self.realized_pnl = self.realized_pnl.add(net);
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    // non-base assets currently held, each needing an oracle price to value
    pub fn collateral_feeds<'a>(&self, config: &'a PoolConfig) -> Vec<&'a str> {
        config
            .collaterals
            .iter()
            .filter(|c| !self.balance(&c.asset).is_zero())
            .map(|c| c.price_feed.as_str())
            .collect()
    }

    /// Base balance at face value plus every other holding at oracle price
    /// times its collateral factor.
    pub fn collateral_value(&self, config: &PoolConfig, oracle: &OracleSnapshot) -> Result<Quote, AccountError> {
        let mut value = self.balance(&config.base_asset);
        for (asset, amount) in &self.balances {
            if *asset == config.base_asset {
                continue;
            }
            let collateral = config
                .collateral(asset)
                .ok_or_else(|| AccountError::UnsupportedAsset(asset.clone()))?;
            let price = oracle.value(&collateral.price_feed)?;
            value += amount * price * collateral.collateral_factor;
        }
        Ok(Quote::new(value))
    }

    fn prune(&mut self, asset: &AssetId) {
        if self.balances.get(asset).is_some_and(|b| b.is_zero()) {
            self.balances.remove(asset);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient {asset} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: AssetId,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Asset {0} is not accepted as collateral")]
    UnsupportedAsset(AssetId),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleManager;
    use rust_decimal_macros::dec;

    fn busd() -> AssetId {
        AssetId::new("BUSD")
    }

    fn bnb() -> AssetId {
        AssetId::new("BNB")
    }

    fn oracle() -> OracleSnapshot {
        let mut oracle = OracleManager::new();
        oracle.set_value("BNBUSD", dec!(500), Timestamp::from_secs(0));
        oracle.set_value("CAKEUSD", dec!(20), Timestamp::from_secs(0));
        OracleSnapshot::capture(&oracle, ["BNBUSD", "CAKEUSD"], Timestamp::from_secs(0), 60).unwrap()
    }

    #[test]
    fn credit_and_debit() {
        let mut account = MarginAccount::new(AccountId(1), Timestamp::from_secs(0));
        account.credit(&busd(), dec!(1000));
        account.debit(&busd(), dec!(400)).unwrap();
        assert_eq!(account.balance(&busd()), dec!(600));

        let result = account.debit(&bnb(), dec!(1));
        assert!(matches!(result, Err(AccountError::InsufficientBalance { .. })));
    }

    #[test]
    fn zero_balances_are_pruned() {
        let mut account = MarginAccount::new(AccountId(1), Timestamp::from_secs(0));
        account.credit(&bnb(), dec!(2));
        account.debit(&bnb(), dec!(2)).unwrap();
        assert!(account.is_empty());
    }

    #[test]
    fn base_balance_absorbs_losses() {
        let mut account = MarginAccount::new(AccountId(1), Timestamp::from_secs(0));
        account.credit(&bnb(), dec!(10));
        account.realize(&busd(), Quote::new(dec!(-250)));
        assert_eq!(account.balance(&busd()), dec!(-250));
        assert_eq!(account.realized_pnl.value(), dec!(-250));
    }

    #[test]
    fn collateral_value_applies_haircuts() {
        let config = PoolConfig::default();
        let mut account = MarginAccount::new(AccountId(1), Timestamp::from_secs(0));
        account.credit(&bnb(), dec!(10));
        account.credit(&AssetId::new("CAKE"), dec!(100));
        account.realize(&busd(), Quote::new(dec!(-200)));

        // 10 * 500 * 0.8 + 100 * 20 * 0.5 - 200
        let value = account.collateral_value(&config, &oracle()).unwrap();
        assert_eq!(value.value(), dec!(4800));
        assert_eq!(account.collateral_feeds(&config), vec!["BNBUSD", "CAKEUSD"]);
    }

    #[test]
    fn collateral_value_needs_price() {
        let config = PoolConfig::default();
        let mut account = MarginAccount::new(AccountId(1), Timestamp::from_secs(0));
        account.credit(&bnb(), dec!(1));

        let mut empty = OracleManager::new();
        empty.set_value("BTCUSD", dec!(1), Timestamp::from_secs(0));
        let snapshot = OracleSnapshot::capture(&empty, ["BTCUSD"], Timestamp::from_secs(0), 60).unwrap();
        let result = account.collateral_value(&config, &snapshot);
        assert!(matches!(result, Err(AccountError::Oracle(OracleError::UnknownFeed(_)))));
    }

    #[test]
    fn take_drains_asset() {
        let mut account = MarginAccount::new(AccountId(1), Timestamp::from_secs(0));
        account.credit(&bnb(), dec!(3));
        assert_eq!(account.take(&bnb()), dec!(3));
        assert_eq!(account.balance(&bnb()), Decimal::ZERO);
    }
}
