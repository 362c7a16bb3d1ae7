//! Liquidation conditions and reward sizing.
//!
//! A trader moves `Healthy -> Liquidatable` when equity drops below the summed
//! maintenance margin, which is only ever evaluated when something touches the
//! account. `Liquidated` is terminal for the positions involved: everything is
//! closed at once, there is no partial liquidation. The state clears when the
//! trader funds the account again.

use crate::margin::MarginSnapshot;
use crate::types::{AccountId, Quote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationState {
    Healthy,
    Liquidatable,
    Liquidated,
}

pub fn evaluate_state(snapshot: &MarginSnapshot, already_liquidated: bool) -> LiquidationState {
    if already_liquidated && snapshot.risk.is_flat() {
        LiquidationState::Liquidated
    } else if snapshot.covers_maintenance() {
        LiquidationState::Healthy
    } else {
        LiquidationState::Liquidatable
    }
}

/// Liquidator's cut of what is left after every position is closed.
/// `remaining * ratio`, clamped to `[min, max]`, never more than is left.
pub fn calculate_reward(remaining: Quote, reward_ratio: Decimal, min_reward: Quote, max_reward: Quote) -> Quote {
    if !remaining.is_positive() {
        return Quote::zero();
    }
    remaining
        .mul(reward_ratio)
        .max(min_reward)
        .min(max_reward)
        .min(remaining)
}

/// Traders whose positions were force-closed and who have not funded since.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationRegistry {
    liquidated: BTreeSet<AccountId>,
}

impl LiquidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, trader: AccountId) {
        self.liquidated.insert(trader);
    }

    pub fn clear(&mut self, trader: AccountId) -> bool {
        self.liquidated.remove(&trader)
    }

    pub fn contains(&self, trader: AccountId) -> bool {
        self.liquidated.contains(&trader)
    }

    pub fn len(&self) -> usize {
        self.liquidated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.liquidated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::margin::PortfolioRisk;
    use crate::symbol::PositionRisk;
    use rust_decimal_macros::dec;

    fn bounds() -> (Quote, Quote) {
        (Quote::new(dec!(10)), Quote::new(dec!(1000)))
    }

    #[test]
    fn reward_is_fraction_of_remaining() {
        let (min, max) = bounds();
        let reward = calculate_reward(Quote::new(dec!(500)), dec!(0.5), min, max);
        assert_eq!(reward.value(), dec!(250));
    }

    #[test]
    fn reward_clamped_to_bounds() {
        let (min, max) = bounds();
        assert_eq!(calculate_reward(Quote::new(dec!(10000)), dec!(0.5), min, max), max);
        assert_eq!(calculate_reward(Quote::new(dec!(12)), dec!(0.5), min, max).value(), dec!(10));
    }

    #[test]
    fn reward_never_exceeds_remaining() {
        let (min, max) = bounds();
        assert_eq!(calculate_reward(Quote::new(dec!(4)), dec!(0.5), min, max).value(), dec!(4));
        assert_eq!(calculate_reward(Quote::new(dec!(-300)), dec!(0.5), min, max), Quote::zero());
    }

    #[test]
    fn state_follows_maintenance() {
        let mut risk = PortfolioRisk::default();
        risk.add(
            &PositionRisk {
                unrealized_pnl: Quote::new(dec!(-3000)),
                notional: Quote::new(dec!(50000)),
                initial_margin: Quote::new(dec!(5000)),
                maintenance_margin: Quote::new(dec!(2500)),
            },
            dec!(0.5),
        );
        let healthy = MarginSnapshot::new(Quote::new(dec!(6000)), risk);
        assert_eq!(evaluate_state(&healthy, false), LiquidationState::Healthy);

        let underwater = MarginSnapshot::new(Quote::new(dec!(5000)), risk);
        assert_eq!(evaluate_state(&underwater, false), LiquidationState::Liquidatable);

        let flat = MarginSnapshot::new(Quote::zero(), PortfolioRisk::default());
        assert_eq!(evaluate_state(&flat, true), LiquidationState::Liquidated);
    }

    #[test]
    fn registry_clears_on_refund() {
        let mut registry = LiquidationRegistry::new();
        registry.mark(AccountId(7));
        assert!(registry.contains(AccountId(7)));
        assert!(registry.clear(AccountId(7)));
        assert!(registry.is_empty());
    }
}
