// 10.1 swapper.rs: converts non-base collateral into the base asset during liquidation.
// `FixedRateSwapper` quotes from a rate table and can be given an execution haircut
// to exercise the slippage bound.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::types::AssetId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("No route from {from} to {to}")]
    NoRoute { from: AssetId, to: AssetId },

    #[error("Slippage exceeded: received {received}, minimum {min_received}")]
    SlippageExceeded { received: Decimal, min_received: Decimal },

    #[error("Invalid swap amount {0}")]
    InvalidAmount(Decimal),
}

pub trait Swapper {
    /// What `amount` of `from` would fetch right now, without executing.
    fn quote(&self, from: &AssetId, to: &AssetId, amount: Decimal) -> Result<Decimal, SwapError>;

    /// Swaps `amount` of `from` into `to`, failing if fewer than `min_received`
    /// units would come back.
    fn swap(
        &mut self,
        from: &AssetId,
        to: &AssetId,
        amount: Decimal,
        min_received: Decimal,
    ) -> Result<Decimal, SwapError>;
}

#[derive(Debug, Clone, Default)]
pub struct FixedRateSwapper {
    rates: BTreeMap<(AssetId, AssetId), Decimal>,
    // fraction lost on execution, 0.02 = 2%
    execution_haircut: Decimal,
}

impl FixedRateSwapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&mut self, from: &AssetId, to: &AssetId, rate: Decimal) {
        self.rates.insert((from.clone(), to.clone()), rate);
    }

    pub fn set_execution_haircut(&mut self, haircut: Decimal) {
        self.execution_haircut = haircut;
    }
}

impl Swapper for FixedRateSwapper {
    fn quote(&self, from: &AssetId, to: &AssetId, amount: Decimal) -> Result<Decimal, SwapError> {
        let rate = self
            .rates
            .get(&(from.clone(), to.clone()))
            .ok_or_else(|| SwapError::NoRoute {
                from: from.clone(),
                to: to.clone(),
            })?;
        Ok(amount * rate * (Decimal::ONE - self.execution_haircut))
    }

    fn swap(
        &mut self,
        from: &AssetId,
        to: &AssetId,
        amount: Decimal,
        min_received: Decimal,
    ) -> Result<Decimal, SwapError> {
        if amount <= Decimal::ZERO {
            return Err(SwapError::InvalidAmount(amount));
        }
        let received = self.quote(from, to, amount)?;
        if received < min_received {
            return Err(SwapError::SlippageExceeded {
                received,
                min_received,
            });
        }
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn swapper() -> FixedRateSwapper {
        let mut swapper = FixedRateSwapper::new();
        swapper.set_rate(&AssetId::new("BNB"), &AssetId::new("BUSD"), dec!(500));
        swapper
    }

    #[test]
    fn test_swap_at_rate() {
        let mut swapper = swapper();
        let received = swapper
            .swap(&AssetId::new("BNB"), &AssetId::new("BUSD"), dec!(2), dec!(900))
            .unwrap();
        assert_eq!(received, dec!(1000));
    }

    #[test]
    fn test_slippage_bound() {
        let mut swapper = swapper();
        swapper.set_execution_haircut(dec!(0.15));
        let result = swapper.swap(&AssetId::new("BNB"), &AssetId::new("BUSD"), dec!(2), dec!(900));
        assert_eq!(
            result,
            Err(SwapError::SlippageExceeded {
                received: dec!(850),
                min_received: dec!(900),
            })
        );
    }

    #[test]
    fn test_no_route() {
        let mut swapper = swapper();
        let result = swapper.swap(&AssetId::new("CAKE"), &AssetId::new("BUSD"), dec!(1), dec!(0));
        assert!(matches!(result, Err(SwapError::NoRoute { .. })));
    }
}
