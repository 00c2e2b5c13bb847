//! Base Rate and Fees
//!
//! The base rate rises with redemptions and decays exponentially with a
//! 12 hour half-life, in whole minutes since the last fee operation.
//!
//! - Borrowing fee rate: `min(max(base_rate, floor), max_borrowing_fee)`
//! - Redemption fee rate: `min(floor + base_rate, 100%)`
//!
//! Views return the decayed values without storing them; only borrowing
//! and redemption operations write the base rate.

use trovex_common::{
    constants::precision::DECIMAL_PRECISION,
    errors::{TrovexError, TrovexResult},
    events::TrovexEvent,
    math::{
        borrowing_rate, calculate_fee, dec_div, decay_base_rate, minutes_passed, mul_div,
        redemption_rate, safe_add,
    },
};

use crate::state::TroveManager;

impl TroveManager {
    /// Base rate decayed to `now`
    pub fn decayed_base_rate(&self, now: u64) -> TrovexResult<u128> {
        let minutes = minutes_passed(now, self.last_fee_operation_time);
        decay_base_rate(self.base_rate, self.params.minute_decay_factor, minutes)
    }

    /// Borrowing fee rate at `now`
    pub fn borrowing_rate(&self, now: u64) -> TrovexResult<u128> {
        Ok(self.borrowing_rate_for(self.decayed_base_rate(now)?))
    }

    pub(crate) fn borrowing_rate_for(&self, base_rate: u128) -> u128 {
        borrowing_rate(base_rate, self.params.borrowing_fee_floor, self.params.max_borrowing_fee)
    }

    /// Borrowing fee on `debt` at `now`
    pub fn borrowing_fee(&self, debt: u128, now: u64) -> TrovexResult<u128> {
        calculate_fee(debt, self.borrowing_rate(now)?)
    }

    /// Redemption fee rate at `now`, before any redemption bump
    pub fn redemption_rate(&self, now: u64) -> TrovexResult<u128> {
        Ok(redemption_rate(self.decayed_base_rate(now)?, self.params.redemption_fee_floor))
    }

    /// Decay the stored base rate ahead of a borrowing operation
    pub(crate) fn decay_base_rate_from_borrowing(&mut self, now: u64) -> TrovexResult<()> {
        let decayed = self.decayed_base_rate(now)?;
        self.base_rate = decayed;
        self.events.emit(TrovexEvent::BaseRateUpdated { base_rate: decayed, timestamp: now });
        self.update_last_fee_op_time(now);
        Ok(())
    }

    /// Base rate after redeeming `collateral_drawn` out of `total_supply`
    pub(crate) fn plan_base_rate_from_redemption(
        &self,
        collateral_drawn: u128,
        price: u128,
        total_supply: u128,
        now: u64,
    ) -> TrovexResult<u128> {
        let decayed = self.decayed_base_rate(now)?;
        let redeemed_fraction = mul_div(collateral_drawn, price, total_supply)?;
        let new_base_rate = safe_add(decayed, redeemed_fraction / self.params.beta)?;
        Ok(new_base_rate.min(DECIMAL_PRECISION))
    }

    pub(crate) fn set_base_rate(&mut self, base_rate: u128, now: u64) {
        self.base_rate = base_rate;
        self.events.emit(TrovexEvent::BaseRateUpdated { base_rate, timestamp: now });
        self.update_last_fee_op_time(now);
    }

    /// Move the fee clock forward once at least a whole minute has passed
    fn update_last_fee_op_time(&mut self, now: u64) {
        if minutes_passed(now, self.last_fee_operation_time) >= 1 {
            self.last_fee_operation_time = now;
            self.events.emit(TrovexEvent::LastFeeOpTimeUpdated { timestamp: now });
        }
    }

    /// Check the caller's fee ceiling for the current mode
    pub(crate) fn validate_max_fee_percentage(
        &self,
        max_fee_percentage: u128,
        floor: u128,
        recovery_mode: bool,
    ) -> TrovexResult<()> {
        let minimum = if recovery_mode { 0 } else { floor };
        if max_fee_percentage < minimum || max_fee_percentage > DECIMAL_PRECISION {
            return Err(TrovexError::InvalidMaxFeePercentage {
                max_fee_percentage,
                minimum,
            });
        }
        Ok(())
    }
}

/// Reject fees above the caller's accepted percentage of `amount`
pub(crate) fn require_user_accepts_fee(fee: u128, amount: u128, max_fee_percentage: u128) -> TrovexResult<()> {
    let fee_percentage = dec_div(fee, amount)?;
    if fee_percentage > max_fee_percentage {
        return Err(TrovexError::FeeExceedsMaximum {
            fee_percentage,
            max_fee_percentage,
        });
    }
    Ok(())
}
