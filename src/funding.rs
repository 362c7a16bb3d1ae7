// 5.0: funding math. longs pay shorts (or the reverse) to pull exposure back toward balance.
// accrual is lazy: nothing runs on a schedule, every interaction folds the elapsed time
// since the last checkpoint into the cumulative per-unit index in one lump sum.

use crate::types::{Price, Quote, SignedSize};
use rust_decimal::Decimal;

// 5.1: how far the skew price sits from spot. positive = skew above spot
pub fn calculate_premium_index(skew_price: Price, index_price: Price) -> Decimal {
    (skew_price.value() - index_price.value()) / index_price.value()
}

// 5.2: price implied by the pool's net exposure. traders net long push it above index.
pub fn skew_price(
    index_price: Price,
    net_volume: SignedSize,
    coefficient: Decimal,
    liquidity: Quote,
) -> Price {
    if !liquidity.is_positive() {
        return index_price;
    }
    let net_notional = net_volume.value() * index_price.value();
    let skewed = index_price.value() * (Decimal::ONE + coefficient * net_notional / liquidity.value());
    Price::new(skewed).unwrap_or(index_price)
}

// 5.3: clamps the premium to the symbol's max rate
pub fn calculate_funding_rate(premium_index: Decimal, max_rate: Decimal) -> Decimal {
    premium_index.max(-max_rate).min(max_rate)
}

// per-unit amount for `elapsed_secs` given a per-period amount
pub fn prorate(per_period: Decimal, elapsed_secs: i64, period_secs: i64) -> Decimal {
    if elapsed_secs <= 0 || period_secs <= 0 {
        return Decimal::ZERO;
    }
    per_period * Decimal::from(elapsed_secs) / Decimal::from(period_secs)
}

// 5.4: new cumulative index after folding in the accrued per-unit funding
pub fn accrue_funding_index(
    prior_index: Decimal,
    per_period: Decimal,
    elapsed_secs: i64,
    period_secs: i64,
) -> Decimal {
    prior_index + prorate(per_period, elapsed_secs, period_secs)
}

// what a position owes since its last snapshot. positive = position pays
pub fn calculate_funding_from_cumulative(
    position_size: SignedSize,
    entry_cumulative: Decimal,
    current_cumulative: Decimal,
) -> Quote {
    let funding_delta = current_cumulative - entry_cumulative;
    Quote::new(position_size.value() * funding_delta)
}
