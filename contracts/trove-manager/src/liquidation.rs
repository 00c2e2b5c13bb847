//! Liquidation
//!
//! Closes undercollateralized Troves. The debt is cancelled against the
//! Stability Pool where possible; whatever the pool cannot absorb is
//! redistributed to the remaining Troves through the reward accumulators.
//!
//! ## Per-Trove split
//!
//! | Mode     | ICR                 | Treatment                                  |
//! |----------|---------------------|--------------------------------------------|
//! | any      | < MCR               | offset `min(debt, pool)`, redistribute rest |
//! | recovery | <= 100%             | redistribute everything                     |
//! | recovery | MCR <= ICR < TCR    | capped offset, excess to surplus pool       |
//!
//! The liquidator receives `collateral / 200` plus the stable gas
//! compensation held in the gas pool.
//!
//! Each Trove is liquidated as one atomic step; a sequence re-reads the
//! system mode between steps.

use trovex_common::{
    constants::{accounts, precision::DECIMAL_PRECISION},
    errors::{ErrorKind, TrovexError, TrovexResult},
    events::{TroveOperation, TrovexEvent},
    math::{collateral_gas_compensation, compute_cr, is_recovery_mode, mul_div, safe_add, safe_sub},
    types::{Address, ExecutionContext, TroveStatus},
};

use crate::rewards::RedistributionPlan;
use crate::state::TroveManager;

/// Amounts moved by a single Trove liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiquidationValues {
    pub entire_debt: u128,
    pub entire_collateral: u128,
    pub collateral_gas_compensation: u128,
    pub stable_gas_compensation: u128,
    pub debt_to_offset: u128,
    pub collateral_to_stability_pool: u128,
    pub debt_to_redistribute: u128,
    pub collateral_to_redistribute: u128,
    pub collateral_surplus: u128,
}

/// Aggregate result of a liquidation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiquidationTotals {
    pub troves_liquidated: u32,
    pub collateral_in_sequence: u128,
    pub debt_in_sequence: u128,
    pub collateral_gas_compensation: u128,
    pub stable_gas_compensation: u128,
    pub debt_offset: u128,
    pub collateral_to_stability_pool: u128,
    pub debt_redistributed: u128,
    pub collateral_redistributed: u128,
    pub collateral_surplus: u128,
}

impl LiquidationTotals {
    fn add(&mut self, values: &LiquidationValues) {
        self.troves_liquidated = self.troves_liquidated.saturating_add(1);
        self.collateral_in_sequence = self.collateral_in_sequence.saturating_add(values.entire_collateral);
        self.debt_in_sequence = self.debt_in_sequence.saturating_add(values.entire_debt);
        self.collateral_gas_compensation = self
            .collateral_gas_compensation
            .saturating_add(values.collateral_gas_compensation);
        self.stable_gas_compensation = self
            .stable_gas_compensation
            .saturating_add(values.stable_gas_compensation);
        self.debt_offset = self.debt_offset.saturating_add(values.debt_to_offset);
        self.collateral_to_stability_pool = self
            .collateral_to_stability_pool
            .saturating_add(values.collateral_to_stability_pool);
        self.debt_redistributed = self.debt_redistributed.saturating_add(values.debt_to_redistribute);
        self.collateral_redistributed = self
            .collateral_redistributed
            .saturating_add(values.collateral_to_redistribute);
        self.collateral_surplus = self.collateral_surplus.saturating_add(values.collateral_surplus);
    }
}

/// Offset against the pool first, redistribute what is left
fn offset_and_redistribution_values(debt: u128, collateral: u128, pool_deposits: u128) -> TrovexResult<(u128, u128)> {
    if pool_deposits == 0 || debt == 0 {
        return Ok((0, 0));
    }
    let debt_to_offset = debt.min(pool_deposits);
    let collateral_to_pool = mul_div(collateral, debt_to_offset, debt)?;
    Ok((debt_to_offset, collateral_to_pool))
}

/// Fully validated liquidation of one Trove
struct LiquidationStep {
    owner: Address,
    values: LiquidationValues,
    redistribution: RedistributionPlan,
    operation: TroveOperation,
}

impl TroveManager {
    /// Liquidate a single Trove
    ///
    /// # Errors
    /// * `TroveNotActive` - no active Trove for `owner`
    /// * `TroveNotUndercollateralized` - normal mode and ICR >= MCR
    /// * `TroveAboveTcrInRecovery` - recovery mode and ICR >= TCR
    /// * `InsufficientPoolBalance` - recovery mode, MCR <= ICR < TCR and the
    ///   pool cannot absorb the whole debt
    /// * `OnlyOneTroveInSystem` - `owner` holds the last Trove
    pub fn liquidate(&mut self, ctx: &ExecutionContext, owner: &Address) -> TrovexResult<LiquidationTotals> {
        ctx.validate()?;
        let values = self.liquidate_step(ctx, owner)?;
        let mut totals = LiquidationTotals::default();
        totals.add(&values);

        self.emit_liquidation(ctx, &totals);
        Ok(totals)
    }

    /// Liquidate up to `max_count` Troves from the tail of the index
    ///
    /// The head Trove is never liquidated. System mode and TCR are read
    /// afresh before each step; in normal mode the walk stops at the first
    /// Trove at or above MCR, in recovery mode at the first Trove at or
    /// above TCR. A Trove the pool cannot cover in recovery mode is skipped.
    ///
    /// An arithmetic failure on the first step is returned; on a later step
    /// the walk stops and reports the Troves already liquidated.
    pub fn liquidate_troves(&mut self, ctx: &ExecutionContext, max_count: u32) -> TrovexResult<LiquidationTotals> {
        ctx.validate()?;
        let mut totals = LiquidationTotals::default();
        let mut candidate = self.sorted.last();

        for _ in 0..max_count {
            let Some(owner) = candidate else {
                break;
            };
            if self.sorted.first() == Some(owner) {
                break;
            }
            candidate = self.sorted.prev(&owner);

            match self.liquidate_step(ctx, &owner) {
                Ok(values) => totals.add(&values),
                Err(TrovexError::InsufficientPoolBalance { .. }) => continue,
                Err(e) if e.kind() == ErrorKind::ModeIneligible => break,
                Err(e) if totals.troves_liquidated == 0 => return Err(e),
                Err(_) => break,
            }
        }

        if totals.troves_liquidated == 0 {
            return Err(TrovexError::NothingToLiquidate);
        }
        self.emit_liquidation(ctx, &totals);
        Ok(totals)
    }

    /// Liquidate the listed Troves, skipping entries that do not qualify
    pub fn batch_liquidate(&mut self, ctx: &ExecutionContext, owners: &[Address]) -> TrovexResult<LiquidationTotals> {
        ctx.validate()?;
        let mut totals = LiquidationTotals::default();

        for owner in owners {
            if self.active_trove(owner).is_err() {
                continue;
            }
            if self.sorted.len() <= 1 {
                break;
            }

            match self.liquidate_step(ctx, owner) {
                Ok(values) => totals.add(&values),
                Err(e) if e.kind() == ErrorKind::ModeIneligible => continue,
                Err(e) if totals.troves_liquidated == 0 => return Err(e),
                Err(_) => break,
            }
        }

        if totals.troves_liquidated == 0 {
            return Err(TrovexError::NothingToLiquidate);
        }
        self.emit_liquidation(ctx, &totals);
        Ok(totals)
    }

    /// Classify the system mode from current totals and liquidate `owner`
    fn liquidate_step(&mut self, ctx: &ExecutionContext, owner: &Address) -> TrovexResult<LiquidationValues> {
        let tcr = self.tcr(ctx.price);
        let recovery_mode = is_recovery_mode(tcr, self.params.ccr);
        let step = self.plan_liquidation(ctx, owner, recovery_mode, tcr)?;
        self.commit_liquidation(ctx, &step)?;
        Ok(step.values)
    }

    // ===== Planning =====

    fn plan_liquidation(
        &self,
        ctx: &ExecutionContext,
        owner: &Address,
        recovery_mode: bool,
        tcr: u128,
    ) -> TrovexResult<LiquidationStep> {
        let price = ctx.price;
        let amounts = self.entire_debt_and_coll(owner)?;
        let icr = compute_cr(amounts.collateral, amounts.debt, price);
        let pool_deposits = self.stability_pool.total_deposits();

        let mut values = LiquidationValues {
            entire_debt: amounts.debt,
            entire_collateral: amounts.collateral,
            stable_gas_compensation: self.params.gas_compensation.min(amounts.debt),
            ..Default::default()
        };

        let operation = if !recovery_mode {
            if icr >= self.params.mcr {
                return Err(TrovexError::TroveNotUndercollateralized { owner: *owner, icr });
            }
            TroveOperation::LiquidateInNormalMode
        } else {
            if icr >= self.params.mcr {
                if icr >= tcr {
                    return Err(TrovexError::TroveAboveTcrInRecovery { owner: *owner, icr, tcr });
                }
                if pool_deposits < amounts.debt {
                    return Err(TrovexError::InsufficientPoolBalance {
                        available: pool_deposits,
                        required: amounts.debt,
                    });
                }
            }
            TroveOperation::LiquidateInRecoveryMode
        };

        if self.sorted.len() <= 1 {
            return Err(TrovexError::OnlyOneTroveInSystem);
        }

        if recovery_mode && icr <= DECIMAL_PRECISION {
            values.collateral_gas_compensation = collateral_gas_compensation(amounts.collateral);
            values.debt_to_redistribute = amounts.debt;
            values.collateral_to_redistribute = amounts.collateral - values.collateral_gas_compensation;
        } else if icr < self.params.mcr {
            values.collateral_gas_compensation = collateral_gas_compensation(amounts.collateral);
            let collateral_to_liquidate = amounts.collateral - values.collateral_gas_compensation;
            let (debt_to_offset, collateral_to_pool) =
                offset_and_redistribution_values(amounts.debt, collateral_to_liquidate, pool_deposits)?;
            values.debt_to_offset = debt_to_offset;
            values.collateral_to_stability_pool = collateral_to_pool;
            values.debt_to_redistribute = amounts.debt - debt_to_offset;
            values.collateral_to_redistribute = collateral_to_liquidate - collateral_to_pool;
        } else {
            // capped at the debt's value times MCR; the rest is returned to the owner
            let collateral_to_offset = mul_div(amounts.debt, self.params.mcr, price)?.min(amounts.collateral);
            values.collateral_gas_compensation = collateral_gas_compensation(collateral_to_offset);
            values.debt_to_offset = amounts.debt;
            values.collateral_to_stability_pool = collateral_to_offset - values.collateral_gas_compensation;
            values.collateral_surplus = amounts.collateral - collateral_to_offset;
        }

        let stake = self.active_trove(owner)?.stake;
        let remaining_stakes = safe_sub(self.total_stakes, stake)?;
        let redistribution = self.plan_redistribution(
            values.collateral_to_redistribute,
            values.debt_to_redistribute,
            remaining_stakes,
        )?;
        self.check_liquidation_balances(&values, &redistribution, amounts.pending_collateral, amounts.pending_debt)?;

        Ok(LiquidationStep {
            owner: *owner,
            values,
            redistribution,
            operation,
        })
    }

    /// Replay the pool and ledger movements of a step on copies
    fn check_liquidation_balances(
        &self,
        values: &LiquidationValues,
        redistribution: &RedistributionPlan,
        pending_collateral: u128,
        pending_debt: u128,
    ) -> TrovexResult<()> {
        let mut active_pool = self.active_pool;
        let mut default_pool = self.default_pool;
        default_pool.decrease(pending_collateral, pending_debt)?;
        active_pool.increase(pending_collateral, pending_debt)?;
        active_pool.decrease(values.collateral_to_stability_pool, values.debt_to_offset)?;
        active_pool.decrease(values.collateral_to_redistribute, values.debt_to_redistribute)?;
        default_pool.increase(values.collateral_to_redistribute, values.debt_to_redistribute)?;
        active_pool.decrease(safe_add(values.collateral_surplus, values.collateral_gas_compensation)?, 0)?;

        safe_add(self.l_collateral, redistribution.collateral_per_stake)?;
        safe_add(self.l_debt, redistribution.debt_per_stake)?;
        safe_add(self.surplus.total(), values.collateral_surplus)?;
        safe_add(self.collateral_ledger.total_withdrawn, values.collateral_gas_compensation)?;
        self.token
            .require_balance(&accounts::STABILITY_POOL, values.debt_to_offset)?;
        self.token
            .require_balance(&accounts::GAS_POOL, values.stable_gas_compensation)?;
        Ok(())
    }

    // ===== Commit =====

    fn commit_liquidation(&mut self, ctx: &ExecutionContext, step: &LiquidationStep) -> TrovexResult<()> {
        let owner = step.owner;
        let values = &step.values;
        let timestamp = ctx.timestamp;

        self.stability_pool.offset(
            values.debt_to_offset,
            values.collateral_to_stability_pool,
            &mut self.events,
            timestamp,
        )?;

        self.apply_pending_rewards(&owner, timestamp)?;
        self.remove_stake(&owner)?;
        self.close_trove_record(&owner, TroveStatus::ClosedByLiquidation)?;

        self.active_pool
            .decrease(values.collateral_to_stability_pool, values.debt_to_offset)?;
        self.token.burn(&accounts::STABILITY_POOL, values.debt_to_offset)?;

        self.apply_redistribution(&step.redistribution, timestamp)?;
        self.send_to_surplus(&owner, values.collateral_surplus, timestamp)?;

        self.active_pool.decrease(values.collateral_gas_compensation, 0)?;
        self.pay_collateral(&ctx.caller, values.collateral_gas_compensation)?;
        self.token
            .transfer(&accounts::GAS_POOL, &ctx.caller, values.stable_gas_compensation)?;

        self.update_system_snapshots(timestamp);
        self.events.emit(TrovexEvent::TotalStakesUpdated {
            total_stakes: self.total_stakes,
            timestamp,
        });
        self.events.emit(TrovexEvent::TroveLiquidated {
            owner,
            debt: values.entire_debt,
            collateral: values.entire_collateral,
            operation: step.operation,
            timestamp,
        });
        Ok(())
    }

    fn emit_liquidation(&mut self, ctx: &ExecutionContext, totals: &LiquidationTotals) {
        self.events.emit(TrovexEvent::Liquidation {
            liquidator: ctx.caller,
            troves_liquidated: totals.troves_liquidated,
            liquidated_debt: totals.debt_in_sequence,
            liquidated_collateral: totals.collateral_in_sequence,
            collateral_gas_compensation: totals.collateral_gas_compensation,
            stable_gas_compensation: totals.stable_gas_compensation,
            timestamp: ctx.timestamp,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use trovex_common::events::EventType;

    /// ICR 400% / 300% / 150% at price 200, each owing 2,210
    fn three_troves() -> TroveManager {
        let mut manager = new_manager();
        open(&mut manager, addr(1), 44_200 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(2), 33_150 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(3), 16_575 * ONE / 1_000, 2_000 * ONE).unwrap();
        manager
    }

    #[test]
    fn test_liquidate_full_offset() {
        let mut manager = three_troves();
        provide(&mut manager, addr(1), 1_500 * ONE).unwrap();
        provide(&mut manager, addr(2), 1_500 * ONE).unwrap();

        let liquidator = addr(9);
        let price = 120 * ONE;
        let totals = manager.liquidate(&ctx(liquidator, price, 0), &addr(3)).unwrap();

        assert_eq!(totals.troves_liquidated, 1);
        assert_eq!(totals.debt_offset, 2_210 * ONE);
        assert_eq!(totals.debt_redistributed, 0);
        assert_eq!(totals.collateral_gas_compensation, 82_875 * ONE / 1_000_000);
        assert_eq!(totals.collateral_to_stability_pool, 16_492_125 * ONE / 1_000_000);

        assert_eq!(manager.trove_status(&addr(3)), TroveStatus::ClosedByLiquidation);
        assert!(!manager.sorted_troves().contains(&addr(3)));
        assert_eq!(manager.stability_pool().total_deposits(), 790 * ONE);
        assert_eq!(manager.stability_pool().collateral(), 16_492_125 * ONE / 1_000_000);
        assert_eq!(manager.token().balance_of(&liquidator), 200 * ONE);
        assert_eq!(manager.collateral_paid_to(&liquidator), 82_875 * ONE / 1_000_000);
        assert_eq!(manager.l_debt(), 0);

        let compounded = manager.stability_pool().compounded_deposit(&addr(1));
        assert!(compounded.abs_diff(395 * ONE) <= 1_000_000);

        let events = manager.events();
        assert_eq!(events.filter_by_type(EventType::TroveLiquidated).len(), 1);
        assert_eq!(events.filter_by_type(EventType::Liquidation).len(), 1);
        assert_eq!(events.filter_by_type(EventType::StabilityOffset).len(), 1);
        assert_invariants(&manager);
    }

    #[test]
    fn test_liquidate_partial_offset() {
        let mut manager = three_troves();
        provide(&mut manager, addr(1), 1_000 * ONE).unwrap();

        let totals = manager.liquidate(&ctx(addr(9), 120 * ONE, 0), &addr(3)).unwrap();

        assert_eq!(totals.debt_offset, 1_000 * ONE);
        assert_eq!(totals.debt_redistributed, 1_210 * ONE);
        assert_eq!(manager.stability_pool().total_deposits(), 0);
        assert_eq!(manager.stability_pool().current_epoch(), 1);
        assert_eq!(manager.default_pool().debt, 1_210 * ONE);
        assert!(manager.l_debt() > 0);
        assert!(manager.has_pending_rewards(&addr(1)));
        assert_invariants(&manager);
    }

    #[test]
    fn test_liquidate_rejects_healthy_troves() {
        let mut manager = three_troves();
        let context = ctx(addr(9), 120 * ONE, 0);

        assert!(matches!(
            manager.liquidate(&context, &addr(1)),
            Err(TrovexError::TroveNotUndercollateralized { .. })
        ));
        assert_eq!(
            manager.liquidate(&context, &addr(7)),
            Err(TrovexError::TroveNotActive { owner: addr(7) })
        );
        assert!(manager.events().filter_by_type(EventType::Liquidation).is_empty());
        assert_invariants(&manager);
    }

    #[test]
    fn test_last_trove_is_never_liquidated() {
        let mut manager = new_manager();
        open(&mut manager, addr(1), 16_575 * ONE / 1_000, 2_000 * ONE).unwrap();

        // 90% ICR in recovery mode, but it is the only Trove
        assert_eq!(
            manager.liquidate(&ctx(addr(9), 120 * ONE, 0), &addr(1)),
            Err(TrovexError::OnlyOneTroveInSystem)
        );
    }

    /// A: 30 collateral, B: 26 collateral, both owing 2,210.
    /// At price 110: ICR A 149.3%, ICR B 129.4%, TCR 139.4%.
    fn recovery_pair() -> TroveManager {
        let mut manager = new_manager();
        open(&mut manager, addr(1), 30 * ONE, 2_000 * ONE).unwrap();
        open(&mut manager, addr(2), 26 * ONE, 2_000 * ONE).unwrap();
        manager
    }

    #[test]
    fn test_recovery_mode_capped_liquidation() {
        let mut manager = recovery_pair();
        provide(&mut manager, addr(1), 2_000 * ONE).unwrap();
        provide(&mut manager, addr(2), 2_000 * ONE).unwrap();

        let context = ctx(addr(9), 110 * ONE, 0);
        assert!(manager.is_recovery_mode(context.price));
        assert!(matches!(
            manager.liquidate(&context, &addr(1)),
            Err(TrovexError::TroveAboveTcrInRecovery { .. })
        ));

        let totals = manager.liquidate(&context, &addr(2)).unwrap();

        // 2,210 * 1.1 / 110 = 22.1 seized, 3.9 left for the owner
        assert_eq!(totals.debt_offset, 2_210 * ONE);
        assert_eq!(totals.collateral_surplus, 39 * ONE / 10);
        assert_eq!(totals.collateral_gas_compensation, 1_105 * ONE / 10_000);
        assert_eq!(totals.collateral_to_stability_pool, 219_895 * ONE / 10_000);
        assert_eq!(manager.surplus_pool().balance_of(&addr(2)), 39 * ONE / 10);
        assert_eq!(manager.stability_pool().total_deposits(), 1_790 * ONE);
        assert_invariants(&manager);

        let claimed = manager.claim_collateral(&ctx(addr(2), 110 * ONE, 0)).unwrap();
        assert_eq!(claimed, 39 * ONE / 10);
        assert_eq!(manager.collateral_paid_to(&addr(2)), 39 * ONE / 10);
        assert_invariants(&manager);
    }

    #[test]
    fn test_recovery_mode_needs_pool_cover() {
        let mut manager = recovery_pair();
        provide(&mut manager, addr(1), 2_000 * ONE).unwrap();

        assert_eq!(
            manager.liquidate(&ctx(addr(9), 110 * ONE, 0), &addr(2)),
            Err(TrovexError::InsufficientPoolBalance {
                available: 2_000 * ONE,
                required: 2_210 * ONE
            })
        );
        assert_eq!(manager.trove_status(&addr(2)), TroveStatus::Active);
        assert_invariants(&manager);
    }

    #[test]
    fn test_liquidate_troves_recovery_cascade() {
        let mut manager = new_manager();
        open(&mut manager, addr(1), 44_200 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(2), 16_575 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(3), 16_575 * ONE / 1_000, 2_000 * ONE).unwrap();

        // price 120: B and C at 90%, TCR 140%
        let context = ctx(addr(9), 120 * ONE, 0);
        assert!(manager.is_recovery_mode(context.price));
        // equal NICR: the later Trove sits nearer the tail
        assert_eq!(manager.sorted_troves().last(), Some(addr(3)));

        let totals = manager.liquidate_troves(&context, 10).unwrap();

        assert_eq!(totals.troves_liquidated, 2);
        assert_eq!(totals.debt_offset, 0);
        assert_eq!(totals.debt_redistributed, totals.debt_in_sequence);
        assert_eq!(totals.stable_gas_compensation, 400 * ONE);
        assert_eq!(manager.trove_status(&addr(2)), TroveStatus::ClosedByLiquidation);
        assert_eq!(manager.trove_status(&addr(3)), TroveStatus::ClosedByLiquidation);
        assert_eq!(manager.sorted_troves().len(), 1);

        // A carries the whole system debt
        let amounts = manager.entire_debt_and_coll(&addr(1)).unwrap();
        assert!(amounts.debt.abs_diff(6_630 * ONE) <= 1_000);
        assert_invariants(&manager);

        assert_eq!(manager.liquidate_troves(&context, 10), Err(TrovexError::NothingToLiquidate));
    }

    #[test]
    fn test_liquidate_troves_respects_count() {
        let mut manager = new_manager();
        open(&mut manager, addr(1), 44_200 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(2), 16_575 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(3), 16_575 * ONE / 1_000, 2_000 * ONE).unwrap();

        let totals = manager.liquidate_troves(&ctx(addr(9), 120 * ONE, 0), 1).unwrap();
        assert_eq!(totals.troves_liquidated, 1);
        assert_eq!(manager.trove_status(&addr(2)), TroveStatus::Active);
        assert_invariants(&manager);
    }

    #[test]
    fn test_batch_liquidate_skips_ineligible() {
        let mut manager = three_troves();
        let context = ctx(addr(9), 120 * ONE, 0);

        let totals = manager
            .batch_liquidate(&context, &[addr(1), addr(99), addr(3)])
            .unwrap();
        assert_eq!(totals.troves_liquidated, 1);
        assert_eq!(manager.trove_status(&addr(1)), TroveStatus::Active);
        assert_eq!(manager.trove_status(&addr(3)), TroveStatus::ClosedByLiquidation);
        assert_invariants(&manager);

        assert_eq!(
            manager.batch_liquidate(&context, &[addr(1), addr(2)]),
            Err(TrovexError::NothingToLiquidate)
        );
    }

    #[test]
    fn test_offset_values() {
        assert_eq!(offset_and_redistribution_values(100, 50, 0).unwrap(), (0, 0));
        assert_eq!(offset_and_redistribution_values(100, 50, 40).unwrap(), (40, 20));
        assert_eq!(offset_and_redistribution_values(100, 50, 400).unwrap(), (100, 50));
    }
}
