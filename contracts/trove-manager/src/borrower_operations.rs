//! Borrower Operations
//!
//! Trove lifecycle: open, adjust (collateral and debt in either direction),
//! close, and the single-purpose wrappers around adjust.
//!
//! ## Validation
//!
//! Normal mode:
//! - Resulting ICR must be at least MCR
//! - Resulting TCR must stay at or above CCR
//!
//! Recovery mode:
//! - New Troves need ICR >= CCR; no borrowing fee is charged
//! - No collateral withdrawal
//! - A debt increase needs ICR >= CCR and must not lower the ICR
//! - Troves cannot be closed
//!
//! Every operation validates the complete plan before the first write.

use trovex_common::{
    constants::accounts,
    errors::{RecoveryModeOp, TrovexError, TrovexResult},
    events::{TroveOperation, TrovexEvent},
    math::{calculate_fee, compute_cr, compute_nominal_cr, safe_add, safe_sub},
    types::{Address, ExecutionContext, Trove, TroveStatus},
};

use crate::fees::require_user_accepts_fee;
use crate::state::{Hints, RankView, TroveManager};

// ============ Requests ============

/// Arguments of [`TroveManager::open_trove`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTroveRequest {
    /// Collateral locked in the new Trove
    pub collateral: u128,
    /// Stable asset sent to the borrower (fee and gas compensation excluded)
    pub debt_requested: u128,
    /// Highest accepted borrowing fee rate
    pub max_fee_percentage: u128,
    pub hints: Hints,
}

/// Arguments of [`TroveManager::adjust_trove`]
///
/// Positive changes add collateral or draw debt; negative changes withdraw
/// collateral or repay debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustTroveRequest {
    pub collateral_change: i128,
    pub debt_change: i128,
    /// Highest accepted borrowing fee rate (debt increases only)
    pub max_fee_percentage: u128,
    pub hints: Hints,
}

/// Where added collateral comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollateralSource {
    /// Deposited by the caller from outside the system
    Caller,
    /// Moved from the caller's Stability Pool gain
    StabilityPoolGain,
}

/// Validated Trove adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AdjustmentPlan {
    pub owner: Address,
    pub collateral_deposit: u128,
    pub collateral_withdrawal: u128,
    pub debt_increase: u128,
    pub fee: u128,
    pub repayment: u128,
    pub new_collateral: u128,
    pub new_debt: u128,
    pub new_nicr: u128,
    pub recovery_mode: bool,
}

fn to_signed(amount: u128) -> TrovexResult<i128> {
    i128::try_from(amount).map_err(|_| TrovexError::Overflow)
}

impl TroveManager {
    // ===== Open =====

    /// Open a Trove for `ctx.caller`
    ///
    /// Mints `debt_requested` to the borrower, the fee to the fee recipient
    /// and the gas compensation to the gas pool. The Trove's debt is
    /// `debt_requested + fee + gas_compensation`.
    pub fn open_trove(&mut self, ctx: &ExecutionContext, request: OpenTroveRequest) -> TrovexResult<()> {
        ctx.validate()?;
        let owner = ctx.caller;
        let price = ctx.price;

        // ===== Plan =====
        if self.troves.get(&owner).map(|t| t.is_active()).unwrap_or(false) {
            return Err(TrovexError::TroveAlreadyActive { owner });
        }
        if request.collateral == 0 {
            return Err(TrovexError::ZeroAmount);
        }
        if self.sorted.is_full() {
            return Err(TrovexError::ListFull { max_size: self.sorted.max_size() });
        }

        let recovery_mode = self.is_recovery_mode(price);
        self.validate_max_fee_percentage(
            request.max_fee_percentage,
            self.params.borrowing_fee_floor,
            recovery_mode,
        )?;

        let fee = if recovery_mode {
            0
        } else {
            let base_rate = self.decayed_base_rate(ctx.timestamp)?;
            calculate_fee(request.debt_requested, self.borrowing_rate_for(base_rate))?
        };

        let net_debt = safe_add(request.debt_requested, fee)?;
        if net_debt < self.params.min_net_debt {
            return Err(TrovexError::BelowMinNetDebt {
                net_debt,
                minimum: self.params.min_net_debt,
            });
        }
        if fee > 0 {
            require_user_accepts_fee(fee, request.debt_requested, request.max_fee_percentage)?;
        }

        let composite_debt = safe_add(net_debt, self.params.gas_compensation)?;
        let icr = compute_cr(request.collateral, composite_debt, price);
        let nicr = compute_nominal_cr(request.collateral, composite_debt);

        if recovery_mode {
            if icr < self.params.ccr {
                return Err(TrovexError::RecoveryModeViolation { operation: RecoveryModeOp::OpenTrove });
            }
        } else {
            if icr < self.params.mcr {
                return Err(TrovexError::IcrBelowMinimum { icr, required: self.params.mcr });
            }
            let new_tcr = self.tcr_after_change(request.collateral, 0, composite_debt, 0, price)?;
            if new_tcr < self.params.ccr {
                return Err(TrovexError::WouldEnterRecoveryMode {
                    current_tcr: self.tcr(price),
                    new_tcr,
                });
            }
        }

        let stake = self.compute_new_stake(request.collateral)?;
        let total_stakes = safe_add(self.total_stakes, stake)?;
        let fee_recipient = self.params.fee_recipient;
        let mut active_pool = self.active_pool;
        active_pool.increase(request.collateral, composite_debt)?;

        // ===== Commit =====
        let ranks = RankView::new(&self.troves, self.l_collateral, self.l_debt);
        self.sorted
            .insert(owner, nicr, request.hints.upper, request.hints.lower, &ranks)?;

        if !recovery_mode {
            self.decay_base_rate_from_borrowing(ctx.timestamp)?;
        }

        let array_index = self.owners.len() as u64;
        let mut trove = Trove::new(owner, request.collateral, composite_debt);
        trove.stake = stake;
        trove.array_index = array_index;
        self.troves.insert(owner, trove);
        self.update_reward_snapshots(&owner);
        self.owners.push(owner);
        self.total_stakes = total_stakes;
        self.active_pool = active_pool;
        self.collateral_ledger.deposit(request.collateral)?;

        self.token.mint(&owner, request.debt_requested)?;
        self.token.mint(&fee_recipient, fee)?;
        self.token.mint(&accounts::GAS_POOL, self.params.gas_compensation)?;
        self.update_system_snapshots(ctx.timestamp);

        // ===== Events =====
        self.events.emit(TrovexEvent::TotalStakesUpdated { total_stakes, timestamp: ctx.timestamp });
        self.events.emit(TrovexEvent::TroveOpened {
            owner,
            collateral: request.collateral,
            debt: composite_debt,
            stake,
            array_index,
            timestamp: ctx.timestamp,
        });
        if fee > 0 {
            self.events.emit(TrovexEvent::BorrowingFeePaid { owner, fee, timestamp: ctx.timestamp });
        }

        Ok(())
    }

    // ===== Adjust =====

    /// Change collateral and/or debt of the caller's Trove
    pub fn adjust_trove(&mut self, ctx: &ExecutionContext, request: AdjustTroveRequest) -> TrovexResult<()> {
        ctx.validate()?;
        let (collateral_deposit, collateral_withdrawal) = if request.collateral_change >= 0 {
            (request.collateral_change.unsigned_abs(), 0)
        } else {
            (0, request.collateral_change.unsigned_abs())
        };
        let (debt_increase, repayment) = if request.debt_change >= 0 {
            (request.debt_change.unsigned_abs(), 0)
        } else {
            (0, request.debt_change.unsigned_abs())
        };

        let plan = self.plan_adjustment(
            ctx,
            &ctx.caller,
            collateral_deposit,
            collateral_withdrawal,
            debt_increase,
            repayment,
            request.max_fee_percentage,
        )?;
        self.commit_adjustment(ctx, &plan, request.hints, CollateralSource::Caller)
    }

    /// Add collateral to the caller's Trove
    pub fn add_collateral(&mut self, ctx: &ExecutionContext, amount: u128, hints: Hints) -> TrovexResult<()> {
        self.adjust_trove(
            ctx,
            AdjustTroveRequest {
                collateral_change: to_signed(amount)?,
                debt_change: 0,
                max_fee_percentage: 0,
                hints,
            },
        )
    }

    /// Withdraw collateral from the caller's Trove
    pub fn withdraw_collateral(&mut self, ctx: &ExecutionContext, amount: u128, hints: Hints) -> TrovexResult<()> {
        self.adjust_trove(
            ctx,
            AdjustTroveRequest {
                collateral_change: -to_signed(amount)?,
                debt_change: 0,
                max_fee_percentage: 0,
                hints,
            },
        )
    }

    /// Draw more stable asset against the caller's Trove
    pub fn withdraw_debt(
        &mut self,
        ctx: &ExecutionContext,
        amount: u128,
        max_fee_percentage: u128,
        hints: Hints,
    ) -> TrovexResult<()> {
        self.adjust_trove(
            ctx,
            AdjustTroveRequest {
                collateral_change: 0,
                debt_change: to_signed(amount)?,
                max_fee_percentage,
                hints,
            },
        )
    }

    /// Repay part of the caller's debt
    pub fn repay_debt(&mut self, ctx: &ExecutionContext, amount: u128, hints: Hints) -> TrovexResult<()> {
        self.adjust_trove(
            ctx,
            AdjustTroveRequest {
                collateral_change: 0,
                debt_change: -to_signed(amount)?,
                max_fee_percentage: 0,
                hints,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn plan_adjustment(
        &self,
        ctx: &ExecutionContext,
        owner: &Address,
        collateral_deposit: u128,
        collateral_withdrawal: u128,
        debt_increase: u128,
        repayment: u128,
        max_fee_percentage: u128,
    ) -> TrovexResult<AdjustmentPlan> {
        let price = ctx.price;
        let amounts = self.entire_debt_and_coll(owner)?;

        if collateral_deposit == 0 && collateral_withdrawal == 0 && debt_increase == 0 && repayment == 0 {
            return Err(TrovexError::ZeroAdjustment);
        }

        let recovery_mode = self.is_recovery_mode(price);

        let fee = if debt_increase > 0 {
            self.validate_max_fee_percentage(
                max_fee_percentage,
                self.params.borrowing_fee_floor,
                recovery_mode,
            )?;
            if recovery_mode {
                0
            } else {
                let base_rate = self.decayed_base_rate(ctx.timestamp)?;
                let fee = calculate_fee(debt_increase, self.borrowing_rate_for(base_rate))?;
                require_user_accepts_fee(fee, debt_increase, max_fee_percentage)?;
                fee
            }
        } else {
            0
        };

        if collateral_withdrawal > amounts.collateral {
            return Err(TrovexError::CollateralWithdrawalExceedsBalance {
                requested: collateral_withdrawal,
                available: amounts.collateral,
            });
        }
        if repayment > 0 {
            let repayable = amounts.debt.saturating_sub(self.params.gas_compensation);
            if repayment > repayable {
                return Err(TrovexError::RepaymentExceedsDebt { repayment, repayable });
            }
            self.token.require_balance(owner, repayment)?;
        }

        let debt_added = safe_add(debt_increase, fee)?;
        let new_collateral = safe_sub(safe_add(amounts.collateral, collateral_deposit)?, collateral_withdrawal)?;
        let new_debt = safe_sub(safe_add(amounts.debt, debt_added)?, repayment)?;

        let old_icr = compute_cr(amounts.collateral, amounts.debt, price);
        let new_icr = compute_cr(new_collateral, new_debt, price);

        if recovery_mode {
            if collateral_withdrawal > 0 {
                return Err(TrovexError::RecoveryModeViolation {
                    operation: RecoveryModeOp::WithdrawCollateral,
                });
            }
            if debt_increase > 0 {
                if new_icr < self.params.ccr {
                    return Err(TrovexError::RecoveryModeViolation {
                        operation: RecoveryModeOp::IncreaseDebt,
                    });
                }
                if new_icr < old_icr {
                    return Err(TrovexError::RecoveryModeViolation {
                        operation: RecoveryModeOp::LowerIcr,
                    });
                }
            }
        } else {
            if new_icr < self.params.mcr {
                return Err(TrovexError::IcrBelowMinimum { icr: new_icr, required: self.params.mcr });
            }
            let new_tcr = self.tcr_after_change(collateral_deposit, collateral_withdrawal, debt_added, repayment, price)?;
            if new_tcr < self.params.ccr {
                return Err(TrovexError::WouldEnterRecoveryMode {
                    current_tcr: self.tcr(price),
                    new_tcr,
                });
            }
        }

        let net_debt = new_debt.saturating_sub(self.params.gas_compensation);
        if net_debt < self.params.min_net_debt {
            return Err(TrovexError::BelowMinNetDebt {
                net_debt,
                minimum: self.params.min_net_debt,
            });
        }

        Ok(AdjustmentPlan {
            owner: *owner,
            collateral_deposit,
            collateral_withdrawal,
            debt_increase,
            fee,
            repayment,
            new_collateral,
            new_debt,
            new_nicr: compute_nominal_cr(new_collateral, new_debt),
            recovery_mode,
        })
    }

    pub(crate) fn commit_adjustment(
        &mut self,
        ctx: &ExecutionContext,
        plan: &AdjustmentPlan,
        hints: Hints,
        source: CollateralSource,
    ) -> TrovexResult<()> {
        let owner = plan.owner;

        self.apply_pending_rewards(&owner, ctx.timestamp)?;
        if plan.debt_increase > 0 && !plan.recovery_mode {
            self.decay_base_rate_from_borrowing(ctx.timestamp)?;
        }

        if let Some(trove) = self.troves.get_mut(&owner) {
            trove.collateral = plan.new_collateral;
            trove.debt = plan.new_debt;
        }
        let stake = self.update_stake_and_total_stakes(&owner, ctx.timestamp)?;

        let mut active_pool = self.active_pool;
        active_pool.increase(plan.collateral_deposit, safe_add(plan.debt_increase, plan.fee)?)?;
        active_pool.decrease(plan.collateral_withdrawal, plan.repayment)?;
        self.active_pool = active_pool;

        if source == CollateralSource::Caller {
            self.collateral_ledger.deposit(plan.collateral_deposit)?;
        }
        self.pay_collateral(&owner, plan.collateral_withdrawal)?;

        let fee_recipient = self.params.fee_recipient;
        self.token.mint(&owner, plan.debt_increase)?;
        self.token.mint(&fee_recipient, plan.fee)?;
        self.token.burn(&owner, plan.repayment)?;
        self.update_system_snapshots(ctx.timestamp);

        // the Trove now carries its new amounts, so its rank equals new_nicr
        let ranks = RankView::new(&self.troves, self.l_collateral, self.l_debt);
        self.sorted
            .re_insert(owner, plan.new_nicr, hints.upper, hints.lower, &ranks)?;

        if plan.fee > 0 {
            self.events.emit(TrovexEvent::BorrowingFeePaid {
                owner,
                fee: plan.fee,
                timestamp: ctx.timestamp,
            });
        }
        self.events.emit(TrovexEvent::TroveUpdated {
            owner,
            collateral: plan.new_collateral,
            debt: plan.new_debt,
            stake,
            operation: TroveOperation::AdjustTrove,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    // ===== Close =====

    /// Repay all debt and withdraw all collateral of the caller's Trove
    ///
    /// The gas compensation reserve is burned from the gas pool, so the
    /// owner repays `debt - gas_compensation`.
    pub fn close_trove(&mut self, ctx: &ExecutionContext) -> TrovexResult<()> {
        ctx.validate()?;
        let owner = ctx.caller;
        let price = ctx.price;

        // ===== Plan =====
        let amounts = self.entire_debt_and_coll(&owner)?;
        if self.is_recovery_mode(price) {
            return Err(TrovexError::RecoveryModeViolation { operation: RecoveryModeOp::CloseTrove });
        }
        if self.sorted.len() <= 1 {
            return Err(TrovexError::OnlyOneTroveInSystem);
        }

        let gas_compensation = self.params.gas_compensation.min(amounts.debt);
        let repayment = amounts.debt - gas_compensation;
        self.token.require_balance(&owner, repayment)?;
        self.token.require_balance(&accounts::GAS_POOL, gas_compensation)?;

        let new_tcr = self.tcr_after_change(0, amounts.collateral, 0, amounts.debt, price)?;
        if new_tcr < self.params.ccr {
            return Err(TrovexError::WouldEnterRecoveryMode {
                current_tcr: self.tcr(price),
                new_tcr,
            });
        }

        // ===== Commit =====
        self.apply_pending_rewards(&owner, ctx.timestamp)?;
        self.remove_stake(&owner)?;
        self.close_trove_record(&owner, TroveStatus::ClosedByOwner)?;

        self.active_pool.decrease(amounts.collateral, amounts.debt)?;
        self.pay_collateral(&owner, amounts.collateral)?;
        self.token.burn(&owner, repayment)?;
        self.token.burn(&accounts::GAS_POOL, gas_compensation)?;
        self.update_system_snapshots(ctx.timestamp);

        self.events.emit(TrovexEvent::TotalStakesUpdated {
            total_stakes: self.total_stakes,
            timestamp: ctx.timestamp,
        });
        self.events.emit(TrovexEvent::TroveClosed {
            owner,
            collateral_returned: amounts.collateral,
            debt_repaid: amounts.debt,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    // ===== Lifecycle helpers =====

    /// Unlink a Trove from the index and owner list and zero its record
    pub(crate) fn close_trove_record(&mut self, owner: &Address, status: TroveStatus) -> TrovexResult<()> {
        let index = self.active_trove(owner)?.array_index as usize;
        if self.owners.get(index) != Some(owner) {
            return Err(TrovexError::NodeNotFound);
        }

        self.sorted.remove(owner)?;
        self.owners.swap_remove(index);
        if let Some(moved) = self.owners.get(index).copied() {
            if let Some(trove) = self.troves.get_mut(&moved) {
                trove.array_index = index as u64;
            }
        }

        if let Some(trove) = self.troves.get_mut(owner) {
            trove.status = status;
            trove.collateral = 0;
            trove.debt = 0;
            trove.stake = 0;
            trove.snapshot = Default::default();
            trove.array_index = 0;
        }
        Ok(())
    }
}
