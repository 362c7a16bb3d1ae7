// margin-pool-core: pool-backed derivatives settlement.
// one shared liquidity pool takes the other side of every trader. risk-first:
// margin, funding and liquidation math decide what the engine lets through.
// all computation is deterministic; vault, swapper and oracle sit behind traits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, SymbolId, AssetId, Price, Quote, Timestamp
//   2.x  symbol/: futures and option symbols, per-symbol book and settlement
//   3.x  symbol_manager.rs: symbol registry, lazy accrual, exposure totals
//   4.x  position.rs: position struct, cost basis, increase/reduce/flip
//   5.x  funding.rs: skew-based funding rate, cumulative index
//   5.5  option_pricing.rs: Black-Scholes premium and delta
//   6.x  liquidity.rs: LP shares, NAV, pool solvency
//   6.5  liquidation.rs: liquidation state and reward
//   7.x  config.rs: pool, collateral and oracle settings
//   8.x  engine/: liquidity, margin, trades, liquidations
//   9.x  oracle.rs: feed registry and per-operation snapshots
//   10.x vault.rs, swapper.rs: external custody and conversion
//   11.x events.rs: committed state transitions for audit
//   12.x account.rs + margin.rs: collateral balances and margin evaluation

// core modules
pub mod account;
pub mod engine;
pub mod events;
pub mod funding;
pub mod liquidation;
pub mod margin;
pub mod option_pricing;
pub mod position;
pub mod symbol;
pub mod symbol_manager;
pub mod types;

// pool and integration modules
pub mod config;
pub mod liquidity;
pub mod oracle;
pub mod swapper;
pub mod vault;

// re exports for convenience
pub use account::*;
pub use engine::*;
pub use events::*;
pub use funding::*;
pub use liquidation::*;
pub use margin::*;
pub use option_pricing::*;
pub use position::*;
pub use symbol::*;
pub use symbol_manager::*;
pub use types::*;
pub use config::{CollateralConfig, ConfigError, Environment, OracleConfig, PoolConfig};
pub use liquidity::{LiquidityError, LiquidityPool, PoolSolvency};
pub use oracle::{FeedValue, OracleError, OracleFeed, OracleManager, OracleSnapshot};
pub use swapper::{FixedRateSwapper, SwapError, Swapper};
pub use vault::{LendingVault, Vault, VaultError};
