//! Fixed-Point Math for the Trovex Core
//!
//! 18-decimal fixed-point primitives (`1e18` == `1.0`) and the financial
//! formulas built on them. Products are formed in a 256-bit intermediate so
//! that `a * b / c` never overflows before the division.

use ethnum::U256;

use crate::constants::{liquidation, precision, time};
use crate::errors::{TrovexError, TrovexResult};

/// One unit in fixed point
pub const DECIMAL_PRECISION: u128 = precision::DECIMAL_PRECISION;

fn narrow(value: U256) -> TrovexResult<u128> {
    let (high, low) = value.into_words();
    if high != 0 {
        return Err(TrovexError::Overflow);
    }
    Ok(low)
}

/// Compute `floor(a * b / c)` with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, c: u128) -> TrovexResult<u128> {
    if c == 0 {
        return Err(TrovexError::DivisionByZero);
    }
    narrow(U256::new(a) * U256::new(b) / U256::new(c))
}

/// Compute `floor((a * b + addend) / c)` and its remainder
///
/// The remainder is below `c`, so it always fits. Used to spread an amount
/// over a total while carrying the rounding error into the next call.
pub fn mul_div_rem(a: u128, b: u128, addend: u128, c: u128) -> TrovexResult<(u128, u128)> {
    if c == 0 {
        return Err(TrovexError::DivisionByZero);
    }
    let numerator = U256::new(a) * U256::new(b) + U256::new(addend);
    let divisor = U256::new(c);
    let quotient = numerator / divisor;
    let remainder = numerator - quotient * divisor;
    Ok((narrow(quotient)?, narrow(remainder)?))
}

/// Compute `floor((a * b - subtrahend) / c) + 1` and how far `quotient * c`
/// overshoots the numerator
///
/// Rounds a per-unit loss up so the sum of individual losses never falls
/// short of the total. The overshoot is at most `c`.
///
/// # Errors
/// `Underflow` when `subtrahend > a * b`.
pub fn mul_div_up_rem(a: u128, b: u128, subtrahend: u128, c: u128) -> TrovexResult<(u128, u128)> {
    if c == 0 {
        return Err(TrovexError::DivisionByZero);
    }
    let product = U256::new(a) * U256::new(b);
    let subtrahend = U256::new(subtrahend);
    if subtrahend > product {
        return Err(TrovexError::Underflow);
    }
    let numerator = product - subtrahend;
    let divisor = U256::new(c);
    let quotient = numerator / divisor + U256::ONE;
    let overshoot = quotient * divisor - numerator;
    Ok((narrow(quotient)?, narrow(overshoot)?))
}

/// Compute `a * b` with a 256-bit intermediate, failing when it leaves `u128`
pub fn wide_mul(a: u128, b: u128) -> TrovexResult<u128> {
    narrow(U256::new(a) * U256::new(b))
}

/// Fixed-point multiply, truncating below the 18-decimal unit
pub fn dec_mul(a: u128, b: u128) -> TrovexResult<u128> {
    mul_div(a, b, DECIMAL_PRECISION)
}

/// Fixed-point divide, truncating below the 18-decimal unit
///
/// # Errors
/// `DivisionByZero` when `b == 0`.
pub fn dec_div(a: u128, b: u128) -> TrovexResult<u128> {
    mul_div(a, DECIMAL_PRECISION, b)
}

/// Fixed-point `base ^ exponent` by exponentiation-by-squaring
///
/// Every intermediate multiply truncates, so the result never exceeds the
/// exact value. Exponents above [`time::MAX_DECAY_EXPONENT`] are not
/// iterated: the result is `0` for `base < 1`, `1` for `base == 1` and an
/// overflow for `base > 1`.
///
/// # Arguments
/// * `base` - Fixed-point base
/// * `exponent` - Integer exponent (minutes, for fee decay)
pub fn dec_pow(base: u128, exponent: u64) -> TrovexResult<u128> {
    if exponent == 0 {
        return Ok(DECIMAL_PRECISION);
    }
    if base == 0 {
        return Ok(0);
    }
    if base == DECIMAL_PRECISION {
        return Ok(DECIMAL_PRECISION);
    }
    if exponent > time::MAX_DECAY_EXPONENT {
        return if base < DECIMAL_PRECISION {
            Ok(0)
        } else {
            Err(TrovexError::Overflow)
        };
    }

    let mut y = DECIMAL_PRECISION;
    let mut x = base;
    let mut n = exponent;

    while n > 1 {
        if n % 2 == 0 {
            x = dec_mul(x, x)?;
            n /= 2;
        } else {
            y = dec_mul(x, y)?;
            x = dec_mul(x, x)?;
            n = (n - 1) / 2;
        }
        if x == 0 {
            return Ok(0);
        }
    }

    dec_mul(x, y)
}

/// Calculate a collateral ratio (ICR or TCR)
///
/// `CR = collateral * price / debt`, fixed point (1.1e18 = 110%).
/// Zero debt yields `u128::MAX` (infinite ratio).
pub fn compute_cr(collateral: u128, debt: u128, price: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    mul_div(collateral, price, debt).unwrap_or(u128::MAX)
}

/// Calculate the nominal collateral ratio used to rank Troves
///
/// `NICR = collateral * 1e20 / debt`; price independent, so a price tick
/// never requires re-sorting. Zero debt yields `u128::MAX`.
pub fn compute_nominal_cr(collateral: u128, debt: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    mul_div(collateral, precision::NICR_PRECISION, debt).unwrap_or(u128::MAX)
}

/// Check if the system is in Recovery Mode
pub fn is_recovery_mode(tcr: u128, ccr: u128) -> bool {
    tcr < ccr
}

/// Whole minutes elapsed since the last fee operation
pub fn minutes_passed(now: u64, last_fee_operation_time: u64) -> u64 {
    now.saturating_sub(last_fee_operation_time) / time::SECONDS_IN_ONE_MINUTE
}

/// Decay a base rate by `minute_decay_factor ^ minutes`, clamped to `[0, 1]`
pub fn decay_base_rate(base_rate: u128, minute_decay_factor: u128, minutes: u64) -> TrovexResult<u128> {
    let decay = dec_pow(minute_decay_factor, minutes)?;
    Ok(dec_mul(base_rate, decay)?.min(DECIMAL_PRECISION))
}

/// Borrowing fee rate: `max(base_rate, floor)`, capped at `max_fee`
pub fn borrowing_rate(base_rate: u128, floor: u128, max_fee: u128) -> u128 {
    base_rate.max(floor).min(max_fee)
}

/// Redemption fee rate: `floor + base_rate`, capped at 100%
pub fn redemption_rate(base_rate: u128, floor: u128) -> u128 {
    floor.saturating_add(base_rate).min(DECIMAL_PRECISION)
}

/// Apply a fee rate to an amount
pub fn calculate_fee(amount: u128, rate: u128) -> TrovexResult<u128> {
    dec_mul(amount, rate)
}

/// Collateral paid to the liquidator as gas compensation (0.5%)
pub fn collateral_gas_compensation(collateral: u128) -> u128 {
    collateral / liquidation::PERCENT_DIVISOR
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> TrovexResult<u128> {
    a.checked_add(b).ok_or(TrovexError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> TrovexResult<u128> {
    a.checked_sub(b).ok_or(TrovexError::Underflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::fees::MINUTE_DECAY_FACTOR;
    use proptest::prelude::*;
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const ONE: u128 = DECIMAL_PRECISION;

    /// 28-digit reference for `base ^ exponent`
    fn reference_pow(base: u128, exponent: u64) -> u128 {
        let mut result = dec!(1);
        let mut x = Decimal::from_i128_with_scale(base as i128, 18);
        let mut n = exponent;
        while n > 0 {
            if n & 1 == 1 {
                result *= x;
            }
            x *= x;
            n >>= 1;
        }
        (result * Decimal::from(DECIMAL_PRECISION as u64))
            .trunc()
            .to_u128()
            .unwrap()
    }

    fn abs_diff(a: u128, b: u128) -> u128 {
        if a > b { a - b } else { b - a }
    }

    #[test]
    fn test_dec_mul_truncates() {
        assert_eq!(dec_mul(ONE / 2, ONE / 2).unwrap(), ONE / 4);
        // 1e-18 * 0.5 truncates to zero rather than rounding up
        assert_eq!(dec_mul(1, ONE / 2).unwrap(), 0);
        assert_eq!(dec_mul(3, ONE / 2).unwrap(), 1);
    }

    #[test]
    fn test_dec_div() {
        assert_eq!(dec_div(ONE, 4 * ONE).unwrap(), ONE / 4);
        assert_eq!(dec_div(2 * ONE, 3 * ONE).unwrap(), 666_666_666_666_666_666);
        assert_eq!(dec_div(ONE, 0), Err(TrovexError::DivisionByZero));
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1e30 * 1e30 overflows u128 but the quotient fits
        let big = 1_000_000_000_000_000_000_000_000_000_000u128;
        assert_eq!(mul_div(big, big, big).unwrap(), big);
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(TrovexError::Overflow));
    }

    #[test]
    fn test_mul_div_rem_carries_remainder() {
        assert_eq!(mul_div_rem(10, ONE, 0, 3).unwrap(), (3_333_333_333_333_333_333, 1));
        assert_eq!(mul_div_rem(10, ONE, 2, 3).unwrap(), (3_333_333_333_333_333_334, 0));
        // 2,210 units spread over 5,000: the numerator is far beyond u128
        assert_eq!(mul_div_rem(2_210 * ONE, ONE, 7, 5_000 * ONE).unwrap(), (442 * ONE / 1_000, 7));
        assert_eq!(mul_div_rem(1, 1, 0, 0), Err(TrovexError::DivisionByZero));
        assert_eq!(mul_div_rem(u128::MAX, 2, 0, 1), Err(TrovexError::Overflow));
    }

    #[test]
    fn test_mul_div_up_rem_rounds_up() {
        assert_eq!(mul_div_up_rem(10, ONE, 0, 3).unwrap(), (3_333_333_333_333_333_334, 2));
        assert_eq!(mul_div_up_rem(10, ONE, 2, 3).unwrap(), (3_333_333_333_333_333_333, 1));
        // an exact division still rounds up by one and overshoots by the divisor
        assert_eq!(
            mul_div_up_rem(2_210 * ONE, ONE, 0, 5_000 * ONE).unwrap(),
            (442 * ONE / 1_000 + 1, 5_000 * ONE)
        );
        assert_eq!(mul_div_up_rem(1, 1, 2, 1), Err(TrovexError::Underflow));
    }

    #[test]
    fn test_wide_mul() {
        assert_eq!(wide_mul(3 * ONE, ONE).unwrap(), 3 * ONE * ONE);
        assert_eq!(wide_mul(u128::MAX, 2), Err(TrovexError::Overflow));
    }

    #[test]
    fn test_dec_pow_boundaries() {
        assert_eq!(dec_pow(0, 0).unwrap(), ONE);
        assert_eq!(dec_pow(ONE / 3, 0).unwrap(), ONE);
        assert_eq!(dec_pow(0, 1).unwrap(), 0);
        assert_eq!(dec_pow(0, 1_000_000).unwrap(), 0);
        assert_eq!(dec_pow(ONE, 1_000_000_000_000).unwrap(), ONE);
        assert_eq!(dec_pow(ONE / 2, 1).unwrap(), ONE / 2);
        assert_eq!(dec_pow(ONE / 2, 3).unwrap(), ONE / 8);
    }

    #[test]
    fn test_dec_pow_beyond_cap() {
        let exponent = time::MAX_DECAY_EXPONENT + 1;
        assert_eq!(dec_pow(MINUTE_DECAY_FACTOR, exponent).unwrap(), 0);
        assert_eq!(dec_pow(ONE, exponent).unwrap(), ONE);
        assert_eq!(dec_pow(2 * ONE, exponent), Err(TrovexError::Overflow));
    }

    #[test]
    fn test_dec_pow_above_one() {
        assert_eq!(dec_pow(2 * ONE, 10).unwrap(), 1024 * ONE);
        assert_eq!(dec_pow(2 * ONE, 200), Err(TrovexError::Overflow));
    }

    #[test]
    fn test_dec_pow_against_reference_small_exponents() {
        for exponent in [1u64, 2, 3, 7, 60, 61, 720, 1_440, 10_080, 43_200] {
            let ours = dec_pow(MINUTE_DECAY_FACTOR, exponent).unwrap();
            let reference = reference_pow(MINUTE_DECAY_FACTOR, exponent);
            assert!(
                abs_diff(ours, reference) <= 100_000,
                "exponent {}: {} vs {}",
                exponent,
                ours,
                reference
            );
        }
    }

    #[test]
    fn test_dec_pow_against_reference_large_exponents() {
        // 1 - 1e-8 raised to 1e7 is about e^-0.1
        let base = ONE - 10_000_000_000;
        for exponent in [1_000_000u64, 10_000_000, 30_000_000] {
            let ours = dec_pow(base, exponent).unwrap();
            let reference = reference_pow(base, exponent);
            assert!(
                abs_diff(ours, reference) <= 1_000_000_000,
                "exponent {}: {} vs {}",
                exponent,
                ours,
                reference
            );
        }
    }

    #[test]
    fn test_half_life() {
        // 720 minutes halves the rate
        let decayed = dec_pow(MINUTE_DECAY_FACTOR, 720).unwrap();
        assert!(abs_diff(decayed, ONE / 2) < 1_000_000_000);
    }

    #[test]
    fn test_base_rate_decay_table() {
        let base_rate = ONE / 100; // 1%

        // 60 seconds: one minute
        let one_minute = decay_base_rate(base_rate, MINUTE_DECAY_FACTOR, minutes_passed(60, 0)).unwrap();
        assert_eq!(one_minute, 9_990_377_588_337_830);

        // 3600 seconds: sixty minutes
        let one_hour = decay_base_rate(base_rate, MINUTE_DECAY_FACTOR, minutes_passed(3_600, 0)).unwrap();
        assert!(abs_diff(one_hour, 9_438_743_126_816_714) <= 100_000);

        // two years: effectively zero
        let two_years = decay_base_rate(base_rate, MINUTE_DECAY_FACTOR, 1_051_200).unwrap();
        assert!(two_years <= 1_000_000_000);
    }

    #[test]
    fn test_minutes_passed() {
        assert_eq!(minutes_passed(59, 0), 0);
        assert_eq!(minutes_passed(60, 0), 1);
        assert_eq!(minutes_passed(3_659, 0), 60);
        assert_eq!(minutes_passed(10, 100), 0);
    }

    #[test]
    fn test_compute_cr() {
        // 1 unit at price 200 backing 100 debt = 200%
        assert_eq!(compute_cr(ONE, 100 * ONE, 200 * ONE), 2 * ONE);
        assert_eq!(compute_cr(ONE, 0, 200 * ONE), u128::MAX);
        // 1.5 units at 100 against 100 = 150%
        assert_eq!(compute_cr(3 * ONE / 2, 100 * ONE, 100 * ONE), 3 * ONE / 2);
    }

    #[test]
    fn test_compute_nominal_cr() {
        // 1 unit of collateral against 100 debt -> 1e18
        assert_eq!(compute_nominal_cr(ONE, 100 * ONE), ONE);
        assert_eq!(compute_nominal_cr(ONE, 0), u128::MAX);
        assert_eq!(compute_nominal_cr(0, ONE), 0);
    }

    #[test]
    fn test_recovery_mode() {
        let ccr = crate::constants::ratios::CCR;
        assert!(!is_recovery_mode(2 * ONE, ccr));
        assert!(!is_recovery_mode(ccr, ccr));
        assert!(is_recovery_mode(ccr - 1, ccr));
    }

    #[test]
    fn test_fee_rates() {
        use crate::constants::fees::{BORROWING_FEE_FLOOR, MAX_BORROWING_FEE, REDEMPTION_FEE_FLOOR};

        assert_eq!(borrowing_rate(0, BORROWING_FEE_FLOOR, MAX_BORROWING_FEE), BORROWING_FEE_FLOOR);
        assert_eq!(borrowing_rate(ONE / 50, BORROWING_FEE_FLOOR, MAX_BORROWING_FEE), ONE / 50);
        assert_eq!(borrowing_rate(ONE / 2, BORROWING_FEE_FLOOR, MAX_BORROWING_FEE), MAX_BORROWING_FEE);

        assert_eq!(redemption_rate(0, REDEMPTION_FEE_FLOOR), REDEMPTION_FEE_FLOOR);
        assert_eq!(redemption_rate(ONE, REDEMPTION_FEE_FLOOR), ONE);

        // 10,000 at 0.5% = 50
        assert_eq!(calculate_fee(10_000 * ONE, BORROWING_FEE_FLOOR).unwrap(), 50 * ONE);
    }

    #[test]
    fn test_collateral_gas_compensation() {
        assert_eq!(collateral_gas_compensation(200 * ONE), ONE);
        assert_eq!(collateral_gas_compensation(199), 0);
    }

    proptest! {
        #[test]
        fn prop_pow_zero_is_one(base in 0u128..=10 * ONE) {
            prop_assert_eq!(dec_pow(base, 0).unwrap(), ONE);
        }

        #[test]
        fn prop_zero_base(exponent in 1u64..=u64::MAX) {
            prop_assert_eq!(dec_pow(0, exponent).unwrap(), 0);
        }

        #[test]
        fn prop_unit_base(exponent in 0u64..=u64::MAX) {
            prop_assert_eq!(dec_pow(ONE, exponent).unwrap(), ONE);
        }

        #[test]
        fn prop_square_is_mul(base in 0u128..=1_000 * ONE) {
            prop_assert_eq!(dec_pow(base, 2).unwrap(), dec_mul(base, base).unwrap());
        }

        #[test]
        fn prop_decay_monotonic(base_rate in 0u128..=ONE, elapsed in 0u64..=100_000_000) {
            let minutes = minutes_passed(elapsed, 0);
            let decayed = decay_base_rate(base_rate, MINUTE_DECAY_FACTOR, minutes).unwrap();
            prop_assert!(decayed <= base_rate);
            if minutes == 0 {
                prop_assert_eq!(decayed, base_rate);
            }
        }
    }
}
