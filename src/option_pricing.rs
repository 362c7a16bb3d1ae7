//! Black-Scholes valuation for option symbols.
//!
//! Everything is computed in `Decimal` with the zero-rate model: premium and
//! delta from spot, strike, implied volatility and time to expiry in years.
//! Below `MIN_TIME` (one second) or with no volatility the option is worth
//! its intrinsic value and delta collapses to 0 or ±1.

use crate::types::{Price, SECONDS_PER_YEAR};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

pub const MIN_VOL: Decimal = dec!(0.0001);

// beyond 8 standard deviations the normal cdf is 0 or 1 to well past Decimal's
// money precision, and `norm_cdf` overflows its internal `powi` not far above 14
const CDF_CUTOFF: Decimal = dec!(8);

pub fn min_time() -> Decimal {
    Decimal::ONE / Decimal::from(SECONDS_PER_YEAR)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionInputs {
    pub spot: Price,
    pub strike: Price,
    pub volatility: Decimal,
    /// Years until expiry
    pub time: Decimal,
    pub is_call: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionValuation {
    pub premium: Decimal,
    pub delta: Decimal,
    pub intrinsic: Decimal,
}

impl OptionValuation {
    pub fn time_value(&self) -> Decimal {
        (self.premium - self.intrinsic).max(Decimal::ZERO)
    }

    pub fn is_in_the_money(&self) -> bool {
        self.intrinsic > Decimal::ZERO
    }
}

pub fn intrinsic_value(spot: Price, strike: Price, is_call: bool) -> Decimal {
    let payoff = if is_call {
        spot.value() - strike.value()
    } else {
        strike.value() - spot.value()
    };
    payoff.max(Decimal::ZERO)
}

/// Years between now and expiry, from a number of seconds
pub fn years_from_secs(secs: i64) -> Decimal {
    Decimal::from(secs.max(0)) / Decimal::from(SECONDS_PER_YEAR)
}

fn cdf(x: Decimal) -> Decimal {
    if x >= CDF_CUTOFF {
        Decimal::ONE
    } else if x <= -CDF_CUTOFF {
        Decimal::ZERO
    } else {
        x.norm_cdf()
    }
}

fn expired_valuation(inputs: &OptionInputs) -> OptionValuation {
    let intrinsic = intrinsic_value(inputs.spot, inputs.strike, inputs.is_call);
    let delta = match (inputs.is_call, intrinsic > Decimal::ZERO) {
        (true, true) => Decimal::ONE,
        (false, true) => -Decimal::ONE,
        _ => Decimal::ZERO,
    };
    OptionValuation {
        premium: intrinsic,
        delta,
        intrinsic,
    }
}

pub fn black_scholes(inputs: &OptionInputs) -> OptionValuation {
    if inputs.time < min_time() || inputs.volatility < MIN_VOL {
        return expired_valuation(inputs);
    }

    let s = inputs.spot.value();
    let k = inputs.strike.value();
    let v = inputs.volatility;
    let t = inputs.time;

    let (Some(sqrt_t), Some(log_moneyness)) = (t.sqrt(), (s / k).checked_ln()) else {
        return expired_valuation(inputs);
    };

    let vol_sqrt_t = v * sqrt_t;
    let d1 = (log_moneyness + dec!(0.5) * v * v * t) / vol_sqrt_t;
    let d2 = d1 - vol_sqrt_t;

    let intrinsic = intrinsic_value(inputs.spot, inputs.strike, inputs.is_call);
    let (raw, delta) = if inputs.is_call {
        (s * cdf(d1) - k * cdf(d2), cdf(d1))
    } else {
        (k * cdf(-d2) - s * cdf(-d1), cdf(d1) - Decimal::ONE)
    };

    // zero-rate premium never sits below payoff; the max absorbs cdf rounding
    OptionValuation {
        premium: raw.max(intrinsic),
        delta,
        intrinsic,
    }
}
