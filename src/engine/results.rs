// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::config::ConfigError;
use crate::liquidity::LiquidityError;
use crate::oracle::OracleError;
use crate::swapper::SwapError;
use crate::symbol::{SymbolError, SymbolStatus, TradeSettlement};
use crate::types::{AccountId, AssetId, Quote, SymbolId, Timestamp};
use crate::vault::VaultError;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct LiquidityResult {
    pub provider: AccountId,
    pub shares: Decimal,
    pub value: Quote,
    // what the vault failed to release on a removal
    pub shortfall: Quote,
    pub nav_after: Quote,
    pub share_supply_after: Decimal,
}

#[derive(Debug, Clone)]
pub struct MarginResult {
    pub trader: AccountId,
    pub asset: AssetId,
    pub requested: Decimal,
    pub amount: Decimal,
    pub balance_after: Decimal,
}

#[derive(Debug, Clone)]
pub struct TradeResult {
    pub trader: AccountId,
    pub settlement: TradeSettlement,
    pub equity_after: Quote,
    pub margin_ratio_after: Decimal,
}

#[derive(Debug, Clone)]
pub struct LiquidationResult {
    pub trader: AccountId,
    pub liquidator: AccountId,
    pub closed: Vec<TradeSettlement>,
    // non-base collateral sold: asset, amount, base received
    pub converted: Vec<(AssetId, Decimal, Decimal)>,
    pub remaining_margin: Quote,
    pub reward: Quote,
    pub pool_residual: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: String },

    #[error("Asset {0} is not accepted as collateral")]
    InvalidCollateral(AssetId),

    #[error("Unknown symbol {0}")]
    UnknownSymbol(SymbolId),

    #[error("Symbol {0} already exists")]
    DuplicateSymbol(SymbolId),

    #[error("Symbol {symbol} not open for this trade ({status:?})")]
    SymbolTradingHalted { symbol: SymbolId, status: SymbolStatus },

    #[error("Symbol {symbol} expired at {expired_at}")]
    SymbolExpired { symbol: SymbolId, expired_at: Timestamp },

    #[error("Symbol {0} has not expired")]
    SymbolNotExpired(SymbolId),

    #[error("Account {trader:?} holds no position in {symbol}")]
    NoPosition { symbol: SymbolId, trader: AccountId },

    #[error("Margin check failed: ratio {ratio}, required {required}")]
    MarginCheckFailed { ratio: Decimal, required: Decimal },

    #[error("Insufficient margin: ratio {ratio}, required {required}")]
    InsufficientMargin { ratio: Decimal, required: Decimal },

    #[error("Insufficient {asset} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: AssetId,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Insufficient pool liquidity: ratio {ratio}, required {required}")]
    InsufficientPoolLiquidity { ratio: Decimal, required: Decimal },

    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: Decimal, held: Decimal },

    #[error("Account {trader:?} not liquidatable: ratio {ratio}, maintenance {required}")]
    NotLiquidatable {
        trader: AccountId,
        ratio: Decimal,
        required: Decimal,
    },

    #[error("Stale oracle data for {feed}: {age}s old, max {max_age}s")]
    StaleOracleData { feed: String, age: i64, max_age: i64 },

    #[error("Unknown oracle feed {0}")]
    UnknownFeed(String),

    #[error("Invalid value {value} from feed {feed}")]
    InvalidFeedValue { feed: String, value: Decimal },

    #[error("Slippage exceeded: received {received}, minimum {min_received}")]
    SlippageExceeded { received: Decimal, min_received: Decimal },

    #[error("No swap route from {from} to {to}")]
    NoSwapRoute { from: AssetId, to: AssetId },

    #[error("Vault released {released} of {requested} {asset}")]
    CollateralUnavailable {
        asset: AssetId,
        requested: Decimal,
        released: Decimal,
    },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::UnknownFeed(feed) => EngineError::UnknownFeed(feed),
            OracleError::StaleOracleData { feed, age, max_age } => EngineError::StaleOracleData { feed, age, max_age },
            OracleError::InvalidFeedValue { feed, value } => EngineError::InvalidFeedValue { feed, value },
        }
    }
}

impl From<SymbolError> for EngineError {
    fn from(err: SymbolError) -> Self {
        match err {
            SymbolError::UnknownSymbol(symbol) => EngineError::UnknownSymbol(symbol),
            SymbolError::DuplicateSymbol(symbol) => EngineError::DuplicateSymbol(symbol),
            SymbolError::TradingHalted { symbol, status } => EngineError::SymbolTradingHalted { symbol, status },
            SymbolError::Expired { symbol, expired_at } => EngineError::SymbolExpired { symbol, expired_at },
            SymbolError::NotExpired(symbol) => EngineError::SymbolNotExpired(symbol),
            SymbolError::NoPosition { symbol, trader } => EngineError::NoPosition { symbol, trader },
            SymbolError::BelowMinTradeVolume { symbol, volume, minimum } => EngineError::InvalidAmount {
                amount: volume,
                reason: format!("below minimum trade volume {minimum} for {symbol}"),
            },
            SymbolError::Oracle(err) => err.into(),
            SymbolError::Config(err) => EngineError::Config(err),
        }
    }
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientBalance {
                asset,
                requested,
                available,
            } => EngineError::InsufficientBalance {
                asset,
                requested,
                available,
            },
            AccountError::UnsupportedAsset(asset) => EngineError::InvalidCollateral(asset),
            AccountError::Oracle(err) => err.into(),
        }
    }
}

impl From<LiquidityError> for EngineError {
    fn from(err: LiquidityError) -> Self {
        match err {
            LiquidityError::InsufficientShares { requested, held } => {
                EngineError::InsufficientShares { requested, held }
            }
            // nothing to price shares against: reported as a zero ratio
            LiquidityError::NoNetAssetValue { .. } => EngineError::InsufficientPoolLiquidity {
                ratio: Decimal::ZERO,
                required: Decimal::ZERO,
            },
            LiquidityError::BelowSolvencyFloor { ratio, required } => {
                EngineError::InsufficientPoolLiquidity { ratio, required }
            }
        }
    }
}

impl From<SwapError> for EngineError {
    fn from(err: SwapError) -> Self {
        match err {
            SwapError::SlippageExceeded { received, min_received } => {
                EngineError::SlippageExceeded { received, min_received }
            }
            SwapError::NoRoute { from, to } => EngineError::NoSwapRoute { from, to },
            SwapError::InvalidAmount(amount) => EngineError::InvalidAmount {
                amount,
                reason: "swap amount must be positive".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn symbol_errors_keep_their_kind() {
        let err: EngineError = SymbolError::Oracle(OracleError::StaleOracleData {
            feed: "BTCUSD".to_string(),
            age: 120,
            max_age: 60,
        })
        .into();
        assert!(matches!(err, EngineError::StaleOracleData { age: 120, .. }));

        let err: EngineError = SymbolError::BelowMinTradeVolume {
            symbol: SymbolId::new("BTCUSD"),
            volume: dec!(0.0001),
            minimum: dec!(0.001),
        }
        .into();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));
    }

    #[test]
    fn solvency_floor_maps_to_pool_liquidity() {
        let err: EngineError = LiquidityError::BelowSolvencyFloor {
            ratio: dec!(0.1),
            required: dec!(0.25),
        }
        .into();
        assert_eq!(
            err,
            EngineError::InsufficientPoolLiquidity {
                ratio: dec!(0.1),
                required: dec!(0.25),
            }
        );
    }
}
