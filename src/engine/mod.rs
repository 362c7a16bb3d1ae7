// 8.0: the margin pool engine. the six top-level operations (add/remove liquidity,
// add/remove margin, trade, liquidate) plus expiry settlement and admin paths.
// deterministic: time comes from the engine clock, prices from one oracle snapshot
// per operation.

mod collateral;
mod config;
mod core;
mod liquidations;
mod pool;
mod results;
mod trades;

pub use collateral::CollateralTransfer;
pub use config::EngineConfig;
pub use core::{Engine, Ledger};
pub use results::{EngineError, LiquidationResult, LiquidityResult, MarginResult, TradeResult};
