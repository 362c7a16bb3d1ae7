//! Engine configuration options.

use crate::config::{ConfigError, Environment, OracleConfig, PoolConfig};
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub oracle: OracleConfig,
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Log every emitted event at debug level.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            oracle: OracleConfig::default(),
            max_events: 100_000,
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Looser oracle bound and verbose events, for test deployments.
    pub fn testnet() -> Self {
        Self {
            oracle: OracleConfig {
                max_staleness_secs: 300,
            },
            verbose: true,
            ..Self::default()
        }
    }

    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Development => Self {
                verbose: true,
                max_events: 10_000,
                ..Self::default()
            },
            Environment::Testnet => Self::testnet(),
            Environment::Mainnet => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        self.oracle.validate()?;
        if self.max_events == 0 {
            return Err(ConfigError::InvalidPool {
                reason: "event log needs room for at least one event".to_string(),
            });
        }
        Ok(())
    }
}
