//! Margin evaluation across all of a trader's positions.
//!
//! Margin is cross-symbol: one pool of collateral backs every position. Equity
//! is collateral value plus unrealized PnL (net of pending funding), and it is
//! compared against the summed per-symbol initial or maintenance requirement.
//! Ratios divide both sides by total notional, so `ratio >= required` is the
//! same test as `equity >= requirement`.

use crate::symbol::PositionRisk;
use crate::types::Quote;
use rust_decimal::Decimal;

/// Position-side totals for one trader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortfolioRisk {
    pub unrealized_pnl: Quote,
    pub notional: Quote,
    pub initial_margin: Quote,
    pub maintenance_margin: Quote,
    // sum of notional * liquidation reward ratio
    pub reward_weight: Decimal,
}

impl PortfolioRisk {
    pub fn add(&mut self, risk: &PositionRisk, reward_ratio: Decimal) {
        self.unrealized_pnl = self.unrealized_pnl.add(risk.unrealized_pnl);
        self.notional = self.notional.add(risk.notional);
        self.initial_margin = self.initial_margin.add(risk.initial_margin);
        self.maintenance_margin = self.maintenance_margin.add(risk.maintenance_margin);
        self.reward_weight += risk.notional.value() * reward_ratio;
    }

    pub fn is_flat(&self) -> bool {
        self.notional == Quote::zero() && self.initial_margin == Quote::zero()
    }

    // notional-weighted liquidation reward ratio
    pub fn reward_ratio(&self) -> Decimal {
        if self.notional.is_positive() {
            self.reward_weight / self.notional.value()
        } else {
            Decimal::ZERO
        }
    }
}

/// Collateral plus positions, evaluated against one oracle snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginSnapshot {
    pub collateral_value: Quote,
    pub risk: PortfolioRisk,
}

impl MarginSnapshot {
    pub fn new(collateral_value: Quote, risk: PortfolioRisk) -> Self {
        Self {
            collateral_value,
            risk,
        }
    }

    pub fn equity(&self) -> Quote {
        self.collateral_value.add(self.risk.unrealized_pnl)
    }

    pub fn margin_ratio(&self) -> Decimal {
        margin_ratio(self.equity(), self.risk.notional)
    }

    pub fn initial_ratio(&self) -> Decimal {
        requirement_ratio(self.risk.initial_margin, self.risk.notional)
    }

    pub fn maintenance_ratio(&self) -> Decimal {
        requirement_ratio(self.risk.maintenance_margin, self.risk.notional)
    }

    pub fn covers_initial(&self) -> bool {
        self.equity() >= self.risk.initial_margin
    }

    pub fn covers_maintenance(&self) -> bool {
        self.equity() >= self.risk.maintenance_margin
    }
}

// equity / notional. with no positions the ratio only says whether equity
// is still there: unbounded while it is, zero once it is gone
pub fn margin_ratio(equity: Quote, notional: Quote) -> Decimal {
    if notional.is_positive() {
        equity.value() / notional.value()
    } else if equity.is_negative() {
        Decimal::ZERO
    } else {
        Decimal::MAX
    }
}

pub fn requirement_ratio(requirement: Quote, notional: Quote) -> Decimal {
    if notional.is_positive() {
        requirement.value() / notional.value()
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn one_btc_long(unrealized: Decimal) -> PortfolioRisk {
        let mut risk = PortfolioRisk::default();
        risk.add(
            &PositionRisk {
                unrealized_pnl: Quote::new(unrealized),
                notional: Quote::new(dec!(50000)),
                initial_margin: Quote::new(dec!(5000)),
                maintenance_margin: Quote::new(dec!(2500)),
            },
            dec!(0.5),
        );
        risk
    }

    #[test]
    fn test_healthy_account() {
        let snapshot = MarginSnapshot::new(Quote::new(dec!(6000)), one_btc_long(Decimal::ZERO));
        assert!(snapshot.covers_initial());
        assert_eq!(snapshot.margin_ratio(), dec!(0.12));
        assert_eq!(snapshot.initial_ratio(), dec!(0.1));
        assert_eq!(snapshot.maintenance_ratio(), dec!(0.05));
    }

    #[test]
    fn test_losses_push_to_liquidatable() {
        let reduced = MarginSnapshot::new(Quote::new(dec!(6000)), one_btc_long(dec!(-2000)));
        assert!(!reduced.covers_initial());
        assert!(reduced.covers_maintenance());

        let underwater = MarginSnapshot::new(Quote::new(dec!(6000)), one_btc_long(dec!(-3600)));
        assert_eq!(underwater.equity().value(), dec!(2400));
        assert!(!underwater.covers_maintenance());
    }

    #[test]
    fn test_no_positions_ratio_is_max() {
        let snapshot = MarginSnapshot::new(Quote::new(dec!(100)), PortfolioRisk::default());
        assert_eq!(snapshot.margin_ratio(), Decimal::MAX);
        assert!(snapshot.covers_maintenance());
        assert!(snapshot.risk.is_flat());
    }

    #[test]
    fn test_flat_account_in_debt() {
        let snapshot = MarginSnapshot::new(Quote::new(dec!(-2000)), PortfolioRisk::default());
        assert_eq!(snapshot.margin_ratio(), Decimal::ZERO);
        assert_eq!(snapshot.maintenance_ratio(), Decimal::ZERO);
        assert!(!snapshot.covers_maintenance());
    }

    #[test]
    fn test_weighted_reward_ratio() {
        let mut risk = one_btc_long(Decimal::ZERO);
        risk.add(
            &PositionRisk {
                unrealized_pnl: Quote::zero(),
                notional: Quote::new(dec!(150000)),
                initial_margin: Quote::zero(),
                maintenance_margin: Quote::zero(),
            },
            dec!(0.1),
        );
        // (50k * 0.5 + 150k * 0.1) / 200k
        assert_eq!(risk.reward_ratio(), dec!(0.2));
    }
}
