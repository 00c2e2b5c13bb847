//! Redemption
//!
//! Swaps stable asset for collateral at face value, drawing from the
//! riskiest Troves that are still at or above MCR. Fully redeemed Troves
//! close and their leftover collateral goes to the surplus pool; at most
//! one Trove is redeemed partially and it must land on the caller's
//! `partial_nicr`, otherwise the walk stops before it.
//!
//! Every redemption raises the base rate in proportion to the share of
//! supply redeemed, and pays a fee in collateral to the fee recipient.

use trovex_common::{
    constants::{accounts, precision::DECIMAL_PRECISION},
    errors::{TrovexError, TrovexResult},
    events::{TroveOperation, TrovexEvent},
    math::{calculate_fee, compute_nominal_cr, mul_div, redemption_rate, safe_add, safe_sub},
    types::{Address, ExecutionContext, TroveStatus},
    Vec,
};

use crate::fees::require_user_accepts_fee;
use crate::state::{Hints, RankView, TroveManager};

/// Arguments of [`TroveManager::redeem_collateral`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemRequest {
    /// Stable asset to redeem
    pub amount: u128,
    /// First Trove to redeem from, as returned by the redemption hints
    pub first_hint: Option<Address>,
    /// Reinsert hints for the partially redeemed Trove
    pub partial_hints: Hints,
    /// Expected NICR of the partially redeemed Trove
    pub partial_nicr: u128,
    /// Troves to visit at most; 0 means no limit
    pub max_iterations: u32,
    /// Highest accepted redemption fee rate
    pub max_fee_percentage: u128,
}

/// Outcome of a redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedemptionTotals {
    pub attempted_amount: u128,
    pub actual_amount: u128,
    pub collateral_drawn: u128,
    pub collateral_fee: u128,
    pub collateral_sent: u128,
    pub troves_redeemed: u32,
    pub base_rate: u128,
}

#[derive(Debug, Clone, Copy)]
struct RedeemedTrove {
    owner: Address,
    debt_lot: u128,
    collateral_lot: u128,
    new_debt: u128,
    new_collateral: u128,
    closed: bool,
}

impl TroveManager {
    /// Redeem `request.amount` of the caller's stable asset for collateral
    ///
    /// # Errors
    /// * `InvalidMaxFeePercentage` - ceiling outside `[floor, 100%]`
    /// * `RedemptionWhenTcrBelowMcr` - system TCR below MCR
    /// * `ZeroAmount`, `InsufficientBalance`
    /// * `UnableToRedeemAnyAmount` - no Trove could be redeemed
    /// * `FeeExceedsMaximum` - fee above the caller's ceiling or above the
    ///   collateral drawn
    pub fn redeem_collateral(&mut self, ctx: &ExecutionContext, request: RedeemRequest) -> TrovexResult<RedemptionTotals> {
        ctx.validate()?;
        let redeemer = ctx.caller;
        let price = ctx.price;

        // ===== Plan =====
        self.validate_max_fee_percentage(request.max_fee_percentage, self.params.redemption_fee_floor, false)?;
        let tcr = self.tcr(price);
        if tcr < self.params.mcr {
            return Err(TrovexError::RedemptionWhenTcrBelowMcr { tcr });
        }
        if request.amount == 0 {
            return Err(TrovexError::ZeroAmount);
        }
        self.token.require_balance(&redeemer, request.amount)?;

        let supply_at_start = self.token.total_supply();
        let gas_compensation = self.params.gas_compensation;

        let mut current = if self.is_valid_first_redemption_hint(request.first_hint, price)? {
            request.first_hint
        } else {
            self.first_redeemable_trove(price)?
        };

        let mut lots: Vec<RedeemedTrove> = Vec::new();
        let mut remaining = request.amount;
        let mut iterations = 0u32;

        while let Some(owner) = current {
            if remaining == 0 || (request.max_iterations != 0 && iterations >= request.max_iterations) {
                break;
            }
            iterations += 1;
            let next = self.sorted.prev(&owner);

            let amounts = self.entire_debt_and_coll(&owner)?;
            let debt_lot = remaining.min(amounts.debt.saturating_sub(gas_compensation));
            let collateral_lot = mul_div(debt_lot, DECIMAL_PRECISION, price)?;
            let new_debt = safe_sub(amounts.debt, debt_lot)?;
            let new_collateral = safe_sub(amounts.collateral, collateral_lot)?;

            let closed = new_debt == gas_compensation;
            if !closed {
                let new_nicr = compute_nominal_cr(new_collateral, new_debt);
                let net_debt = new_debt.saturating_sub(gas_compensation);
                // cancelled partial: stale hint or dust left behind
                if new_nicr == 0 || new_nicr != request.partial_nicr || net_debt < self.params.min_net_debt {
                    break;
                }
            }

            lots.push(RedeemedTrove {
                owner,
                debt_lot,
                collateral_lot,
                new_debt,
                new_collateral,
                closed,
            });
            remaining -= debt_lot;
            current = next;
        }

        let actual_amount = request.amount - remaining;
        if actual_amount == 0 {
            return Err(TrovexError::UnableToRedeemAnyAmount);
        }

        let mut collateral_drawn = 0u128;
        for lot in &lots {
            collateral_drawn = safe_add(collateral_drawn, lot.collateral_lot)?;
        }

        let base_rate = self.plan_base_rate_from_redemption(collateral_drawn, price, supply_at_start, ctx.timestamp)?;
        let fee_rate = redemption_rate(base_rate, self.params.redemption_fee_floor);
        let collateral_fee = calculate_fee(collateral_drawn, fee_rate)?;
        if collateral_fee >= collateral_drawn {
            return Err(TrovexError::FeeExceedsMaximum {
                fee_percentage: fee_rate,
                max_fee_percentage: DECIMAL_PRECISION,
            });
        }
        require_user_accepts_fee(collateral_fee, collateral_drawn, request.max_fee_percentage)?;
        let collateral_sent = collateral_drawn - collateral_fee;

        self.check_redemption_balances(&lots, collateral_drawn, collateral_fee, &redeemer)?;

        // ===== Commit =====
        for lot in &lots {
            self.commit_redeemed_trove(ctx, lot, request.partial_hints)?;
        }

        let fee_recipient = self.params.fee_recipient;
        self.set_base_rate(base_rate, ctx.timestamp);
        self.token.burn(&redeemer, actual_amount)?;
        self.active_pool.decrease(collateral_drawn, actual_amount)?;
        self.pay_collateral(&fee_recipient, collateral_fee)?;
        self.pay_collateral(&redeemer, collateral_sent)?;
        self.update_system_snapshots(ctx.timestamp);

        self.events.emit(TrovexEvent::Redemption {
            redeemer,
            attempted_amount: request.amount,
            actual_amount,
            collateral_sent,
            collateral_fee,
            timestamp: ctx.timestamp,
        });

        Ok(RedemptionTotals {
            attempted_amount: request.amount,
            actual_amount,
            collateral_drawn,
            collateral_fee,
            collateral_sent,
            troves_redeemed: lots.len() as u32,
            base_rate,
        })
    }

    /// A hint is usable when it is at or above MCR and its lower neighbour
    /// is not
    fn is_valid_first_redemption_hint(&self, hint: Option<Address>, price: u128) -> TrovexResult<bool> {
        let Some(hint) = hint else {
            return Ok(false);
        };
        if !self.sorted.contains(&hint) || self.current_icr(&hint, price)? < self.params.mcr {
            return Ok(false);
        }
        match self.sorted.next(&hint) {
            None => Ok(true),
            Some(next) => Ok(self.current_icr(&next, price)? < self.params.mcr),
        }
    }

    /// Lowest-ranked Trove at or above MCR
    pub(crate) fn first_redeemable_trove(&self, price: u128) -> TrovexResult<Option<Address>> {
        let mut current = self.sorted.last();
        while let Some(owner) = current {
            if self.current_icr(&owner, price)? >= self.params.mcr {
                break;
            }
            current = self.sorted.prev(&owner);
        }
        Ok(current)
    }

    /// Replay the redemption's pool and ledger movements on copies
    fn check_redemption_balances(
        &self,
        lots: &[RedeemedTrove],
        collateral_drawn: u128,
        collateral_fee: u128,
        redeemer: &Address,
    ) -> TrovexResult<()> {
        let mut active_pool = self.active_pool;
        let mut default_pool = self.default_pool;
        let mut gas_burned = 0u128;
        let mut surplus = self.surplus.total();

        for lot in lots {
            let amounts = self.entire_debt_and_coll(&lot.owner)?;
            default_pool.decrease(amounts.pending_collateral, amounts.pending_debt)?;
            active_pool.increase(amounts.pending_collateral, amounts.pending_debt)?;
            if lot.closed {
                active_pool.decrease(lot.new_collateral, lot.new_debt)?;
                gas_burned = safe_add(gas_burned, lot.new_debt)?;
                surplus = safe_add(surplus, lot.new_collateral)?;
            }
        }
        let actual_amount = lots.iter().map(|lot| lot.debt_lot).sum::<u128>();
        active_pool.decrease(collateral_drawn, actual_amount)?;

        self.token.require_balance(&accounts::GAS_POOL, gas_burned)?;
        self.check_collateral_payout(&self.params.fee_recipient, collateral_fee)?;
        self.check_collateral_payout(redeemer, collateral_drawn)?;
        Ok(())
    }

    fn commit_redeemed_trove(&mut self, ctx: &ExecutionContext, lot: &RedeemedTrove, hints: Hints) -> TrovexResult<()> {
        let owner = lot.owner;
        let timestamp = ctx.timestamp;

        if lot.closed {
            self.apply_pending_rewards(&owner, timestamp)?;
            self.remove_stake(&owner)?;
            self.close_trove_record(&owner, TroveStatus::ClosedByRedemption)?;

            // the gas compensation is the only debt left
            self.active_pool.decrease(0, lot.new_debt)?;
            self.token.burn(&accounts::GAS_POOL, lot.new_debt)?;
            self.send_to_surplus(&owner, lot.new_collateral, timestamp)?;
        } else {
            self.apply_pending_rewards(&owner, timestamp)?;
            if let Some(trove) = self.troves.get_mut(&owner) {
                trove.collateral = lot.new_collateral;
                trove.debt = lot.new_debt;
            }
            let stake = self.update_stake_and_total_stakes(&owner, timestamp)?;

            let new_nicr = compute_nominal_cr(lot.new_collateral, lot.new_debt);
            let ranks = RankView::new(&self.troves, self.l_collateral, self.l_debt);
            self.sorted
                .re_insert(owner, new_nicr, hints.upper, hints.lower, &ranks)?;
            self.events.emit(TrovexEvent::TroveUpdated {
                owner,
                collateral: lot.new_collateral,
                debt: lot.new_debt,
                stake,
                operation: TroveOperation::RedeemCollateral,
                timestamp,
            });
        }

        self.events.emit(TrovexEvent::TroveRedeemed {
            owner,
            debt_redeemed: lot.debt_lot,
            collateral_drawn: lot.collateral_lot,
            closed: lot.closed,
            timestamp,
        });
        Ok(())
    }
}
