// 4.0: per-trader position on one symbol. cost is the signed entry notional, so
// unrealized pnl = volume * mark - cost - pending funding.
// 4.1 has the increase/reduce/flip logic at the bottom.

use crate::types::{Price, Quote, SignedSize};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub volume: SignedSize,
    // signed: long positions carry positive cost, shorts negative
    pub cost: Quote,
    pub last_cumulative_funding_index: Decimal,
}

impl Position {
    pub fn new(funding_index: Decimal) -> Self {
        Self {
            volume: SignedSize::zero(),
            cost: Quote::zero(),
            last_cumulative_funding_index: funding_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_zero()
    }

    // weighted average entry, None when flat
    pub fn entry_price(&self) -> Option<Price> {
        if self.is_empty() {
            return None;
        }
        Price::new(self.cost.value() / self.volume.value())
    }

    // funding owed since the last settlement. positive = position pays
    pub fn pending_funding(&self, current_funding_index: Decimal) -> Quote {
        crate::funding::calculate_funding_from_cumulative(
            self.volume,
            self.last_cumulative_funding_index,
            current_funding_index,
        )
    }

    // 4.1: paper gains/losses at mark, net of unsettled funding
    pub fn unrealized_pnl(&self, mark_price: Decimal, current_funding_index: Decimal) -> Quote {
        calculate_unrealized_pnl(self.volume, self.cost, mark_price)
            .sub(self.pending_funding(current_funding_index))
    }

    pub fn notional(&self, index_price: Price) -> Quote {
        Quote::new(self.volume.abs() * index_price.value())
    }

    // realizes pending funding and moves the snapshot forward
    pub fn settle_funding(&mut self, current_funding_index: Decimal) -> Quote {
        let funding = self.pending_funding(current_funding_index);
        self.last_cumulative_funding_index = current_funding_index;
        funding
    }

    /// Applies a signed volume change at `price` and returns the pnl realized by
    /// any reduced part. Funding must be settled first. Option premiums can be
    /// zero, so the trade price is a plain per-unit value rather than a `Price`.
    pub fn apply_trade(&mut self, delta: SignedSize, price: Decimal) -> PositionChange {
        let old_volume = self.volume;

        if delta.is_zero() {
            return PositionChange::unchanged(old_volume);
        }

        let same_direction = self.is_empty() || (self.volume.is_long() == delta.is_long());
        let realized_pnl = if same_direction {
            increase_position(self, delta, price);
            Quote::zero()
        } else if delta.abs() <= self.volume.abs() {
            reduce_position(self, delta, price)
        } else {
            flip_position(self, delta, price)
        };

        PositionChange {
            realized_pnl,
            old_volume,
            new_volume: self.volume,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChange {
    pub realized_pnl: Quote,
    pub old_volume: SignedSize,
    pub new_volume: SignedSize,
}

impl PositionChange {
    fn unchanged(volume: SignedSize) -> Self {
        Self {
            realized_pnl: Quote::zero(),
            old_volume: volume,
            new_volume: volume,
        }
    }
}

// 4.2: the pnl formula. volume * mark - cost
pub fn calculate_unrealized_pnl(volume: SignedSize, cost: Quote, mark_price: Decimal) -> Quote {
    Quote::new(volume.value() * mark_price - cost.value())
}

// 4.3: same direction. cost accumulates, entry averages out implicitly
fn increase_position(position: &mut Position, delta: SignedSize, price: Decimal) {
    position.volume = position.volume.add(delta.value());
    position.cost = position.cost.add(Quote::new(delta.value() * price));
}

// 4.4: opposite direction, at most the whole position
fn reduce_position(position: &mut Position, delta: SignedSize, price: Decimal) -> Quote {
    let fraction = delta.abs() / position.volume.abs();
    let cost_removed = position.cost.mul(fraction);
    let realized = Quote::new(-delta.value() * price).sub(cost_removed);

    position.volume = position.volume.add(delta.value());
    position.cost = if position.volume.is_zero() {
        Quote::zero()
    } else {
        position.cost.sub(cost_removed)
    };

    realized
}

// 4.5: close everything, then open the remainder on the other side at `price`
fn flip_position(position: &mut Position, delta: SignedSize, price: Decimal) -> Quote {
    let closing = SignedSize::new(-position.volume.value());
    let realized = reduce_position(position, closing, price);

    let remainder = SignedSize::new(delta.value() - closing.value());
    increase_position(position, remainder, price);

    realized
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_one_btc() -> Position {
        let mut pos = Position::new(Decimal::ZERO);
        pos.apply_trade(SignedSize::new(dec!(1)), dec!(50000));
        pos
    }

    #[test]
    fn unrealized_pnl_long_profit() {
        let pos = long_one_btc();
        let pnl = pos.unrealized_pnl(dec!(52000), Decimal::ZERO);
        assert_eq!(pnl.value(), dec!(2000));
    }

    #[test]
    fn unrealized_pnl_short_profit() {
        let mut pos = Position::new(Decimal::ZERO);
        pos.apply_trade(SignedSize::new(dec!(-1)), dec!(50000));
        assert_eq!(pos.cost.value(), dec!(-50000));

        let pnl = pos.unrealized_pnl(dec!(48000), Decimal::ZERO);
        assert_eq!(pnl.value(), dec!(2000));
    }

    #[test]
    fn unrealized_pnl_net_of_funding() {
        let pos = long_one_btc();
        // index moved by 100 per unit, long pays
        let pnl = pos.unrealized_pnl(dec!(52000), dec!(100));
        assert_eq!(pnl.value(), dec!(1900));
    }

    #[test]
    fn increase_averages_entry() {
        let mut pos = long_one_btc();
        let change = pos.apply_trade(SignedSize::new(dec!(1)), dec!(52000));

        assert_eq!(change.realized_pnl, Quote::zero());
        assert!(change.old_volume.is_increased_by(change.new_volume));
        assert_eq!(pos.volume.value(), dec!(2));
        assert_eq!(pos.entry_price().unwrap().value(), dec!(51000));
    }

    #[test]
    fn reduce_partial_keeps_entry() {
        let mut pos = Position::new(Decimal::ZERO);
        pos.apply_trade(SignedSize::new(dec!(2)), dec!(50000));

        let change = pos.apply_trade(SignedSize::new(dec!(-1)), dec!(52000));
        assert_eq!(change.realized_pnl.value(), dec!(2000));
        assert!(!change.old_volume.is_increased_by(change.new_volume));
        assert_eq!(pos.volume.value(), dec!(1));
        assert_eq!(pos.entry_price().unwrap().value(), dec!(50000));
    }

    #[test]
    fn full_close_zeroes_cost() {
        let mut pos = Position::new(Decimal::ZERO);
        pos.apply_trade(SignedSize::new(dec!(3)), dec!(33333.33));

        let change = pos.apply_trade(SignedSize::new(dec!(-3)), dec!(30000));
        assert!(pos.is_empty());
        assert_eq!(pos.cost, Quote::zero());
        assert_eq!(change.realized_pnl.value(), dec!(-9999.99));
        assert!(pos.entry_price().is_none());
    }

    #[test]
    fn flip_long_to_short() {
        let mut pos = long_one_btc();
        let change = pos.apply_trade(SignedSize::new(dec!(-3)), dec!(51000));

        assert_eq!(change.realized_pnl.value(), dec!(1000));
        assert!(change.old_volume.is_increased_by(change.new_volume));
        assert_eq!(pos.volume.value(), dec!(-2));
        assert_eq!(pos.cost.value(), dec!(-102000));
        assert_eq!(pos.entry_price().unwrap().value(), dec!(51000));
    }

    #[test]
    fn zero_delta_is_noop() {
        let mut pos = long_one_btc();
        let before = pos.clone();
        let change = pos.apply_trade(SignedSize::zero(), dec!(60000));
        assert_eq!(pos, before);
        assert_eq!(change.old_volume, change.new_volume);
    }

    #[test]
    fn settle_funding_moves_snapshot() {
        let mut pos = long_one_btc();
        let paid = pos.settle_funding(dec!(35));
        assert_eq!(paid.value(), dec!(35));
        assert_eq!(pos.last_cumulative_funding_index, dec!(35));
        assert_eq!(pos.pending_funding(dec!(35)), Quote::zero());
    }

    #[test]
    fn notional_uses_index() {
        let pos = long_one_btc();
        assert_eq!(pos.notional(Price::new_unchecked(dec!(55000))).value(), dec!(55000));
    }
}
