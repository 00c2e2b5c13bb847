//! Pull-Based Redistribution Rewards
//!
//! Liquidated debt and collateral that the Stability Pool cannot absorb are
//! credited to every active Trove through two global accumulators,
//! `L_collateral` and `L_debt` (reward per unit of stake). A Trove's pending
//! reward is `stake * (L - snapshot) / 1e18`, applied lazily the next time
//! the Trove is touched.

use trovex_common::{
    constants::precision::DECIMAL_PRECISION,
    errors::{TrovexError, TrovexResult},
    events::{TroveOperation, TrovexEvent},
    math::{mul_div, mul_div_rem, safe_add, safe_sub},
    types::{Address, RewardSnapshot, Trove},
};

use crate::state::TroveManager;

/// Pending `(collateral, debt)` reward of a Trove
pub(crate) fn pending_rewards(trove: &Trove, l_collateral: u128, l_debt: u128) -> TrovexResult<(u128, u128)> {
    if !trove.is_active() || trove.stake == 0 {
        return Ok((0, 0));
    }
    let collateral_delta = safe_sub(l_collateral, trove.snapshot.collateral)?;
    let debt_delta = safe_sub(l_debt, trove.snapshot.debt)?;
    Ok((
        mul_div(trove.stake, collateral_delta, DECIMAL_PRECISION)?,
        mul_div(trove.stake, debt_delta, DECIMAL_PRECISION)?,
    ))
}

/// Accumulator increments for one redistribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct RedistributionPlan {
    pub collateral: u128,
    pub debt: u128,
    pub collateral_per_stake: u128,
    pub debt_per_stake: u128,
    pub collateral_error: u128,
    pub debt_error: u128,
}

impl TroveManager {
    /// Pending collateral reward of an active Trove
    pub fn pending_collateral_reward(&self, owner: &Address) -> TrovexResult<u128> {
        Ok(pending_rewards(self.active_trove(owner)?, self.l_collateral, self.l_debt)?.0)
    }

    /// Pending debt reward of an active Trove
    pub fn pending_debt_reward(&self, owner: &Address) -> TrovexResult<u128> {
        Ok(pending_rewards(self.active_trove(owner)?, self.l_collateral, self.l_debt)?.1)
    }

    pub fn has_pending_rewards(&self, owner: &Address) -> bool {
        self.troves
            .get(owner)
            .map(|t| t.is_active() && t.snapshot.collateral < self.l_collateral)
            .unwrap_or(false)
    }

    /// Fold pending rewards into the Trove record and move them from the
    /// default pool to the active pool
    pub(crate) fn apply_pending_rewards(&mut self, owner: &Address, timestamp: u64) -> TrovexResult<()> {
        let trove = self.active_trove(owner)?;
        let (pending_collateral, pending_debt) = pending_rewards(trove, self.l_collateral, self.l_debt)?;
        let new_collateral = safe_add(trove.collateral, pending_collateral)?;
        let new_debt = safe_add(trove.debt, pending_debt)?;
        let stake = trove.stake;

        let mut default_pool = self.default_pool;
        let mut active_pool = self.active_pool;
        default_pool.decrease(pending_collateral, pending_debt)?;
        active_pool.increase(pending_collateral, pending_debt)?;

        let snapshot = RewardSnapshot { collateral: self.l_collateral, debt: self.l_debt };
        if let Some(trove) = self.troves.get_mut(owner) {
            trove.collateral = new_collateral;
            trove.debt = new_debt;
            trove.snapshot = snapshot;
        }
        self.default_pool = default_pool;
        self.active_pool = active_pool;

        if pending_collateral > 0 || pending_debt > 0 {
            self.events.emit(TrovexEvent::TroveUpdated {
                owner: *owner,
                collateral: new_collateral,
                debt: new_debt,
                stake,
                operation: TroveOperation::ApplyPendingRewards,
                timestamp,
            });
        }
        Ok(())
    }

    /// Stake for `collateral` at the current snapshot ratio
    pub(crate) fn compute_new_stake(&self, collateral: u128) -> TrovexResult<u128> {
        if self.total_collateral_snapshot == 0 {
            return Ok(collateral);
        }
        mul_div(collateral, self.total_stakes_snapshot, self.total_collateral_snapshot)
    }

    /// Recompute a Trove's stake from its recorded collateral
    pub(crate) fn update_stake_and_total_stakes(&mut self, owner: &Address, timestamp: u64) -> TrovexResult<u128> {
        let trove = self.active_trove(owner)?;
        let old_stake = trove.stake;
        let new_stake = self.compute_new_stake(trove.collateral)?;
        let total_stakes = safe_add(safe_sub(self.total_stakes, old_stake)?, new_stake)?;

        if let Some(trove) = self.troves.get_mut(owner) {
            trove.stake = new_stake;
        }
        self.total_stakes = total_stakes;
        self.events.emit(TrovexEvent::TotalStakesUpdated { total_stakes, timestamp });
        Ok(new_stake)
    }

    /// Remove a Trove's stake from the total
    pub(crate) fn remove_stake(&mut self, owner: &Address) -> TrovexResult<()> {
        let stake = self.troves.get(owner).map(|t| t.stake).unwrap_or(0);
        self.total_stakes = safe_sub(self.total_stakes, stake)?;
        if let Some(trove) = self.troves.get_mut(owner) {
            trove.stake = 0;
        }
        Ok(())
    }

    /// Point a Trove's snapshots at the current accumulators
    pub(crate) fn update_reward_snapshots(&mut self, owner: &Address) {
        let snapshot = RewardSnapshot { collateral: self.l_collateral, debt: self.l_debt };
        if let Some(trove) = self.troves.get_mut(owner) {
            trove.snapshot = snapshot;
        }
    }

    /// Plan a redistribution over `total_stakes` with error feedback
    pub(crate) fn plan_redistribution(
        &self,
        collateral: u128,
        debt: u128,
        total_stakes: u128,
    ) -> TrovexResult<RedistributionPlan> {
        if debt == 0 && collateral == 0 {
            return Ok(RedistributionPlan::default());
        }
        if total_stakes == 0 {
            return Err(TrovexError::DivisionByZero);
        }

        let (collateral_per_stake, collateral_error) = mul_div_rem(
            collateral,
            DECIMAL_PRECISION,
            self.last_collateral_error_redistribution,
            total_stakes,
        )?;
        let (debt_per_stake, debt_error) =
            mul_div_rem(debt, DECIMAL_PRECISION, self.last_debt_error_redistribution, total_stakes)?;

        Ok(RedistributionPlan {
            collateral,
            debt,
            collateral_per_stake,
            debt_per_stake,
            collateral_error,
            debt_error,
        })
    }

    /// Apply a planned redistribution: bump the accumulators and move the
    /// amounts from the active pool to the default pool
    pub(crate) fn apply_redistribution(&mut self, plan: &RedistributionPlan, timestamp: u64) -> TrovexResult<()> {
        if plan.debt == 0 && plan.collateral == 0 {
            return Ok(());
        }

        let l_collateral = safe_add(self.l_collateral, plan.collateral_per_stake)?;
        let l_debt = safe_add(self.l_debt, plan.debt_per_stake)?;
        let mut active_pool = self.active_pool;
        let mut default_pool = self.default_pool;
        active_pool.decrease(plan.collateral, plan.debt)?;
        default_pool.increase(plan.collateral, plan.debt)?;

        self.l_collateral = l_collateral;
        self.l_debt = l_debt;
        self.last_collateral_error_redistribution = plan.collateral_error;
        self.last_debt_error_redistribution = plan.debt_error;
        self.active_pool = active_pool;
        self.default_pool = default_pool;

        self.events.emit(TrovexEvent::Redistribution {
            debt: plan.debt,
            collateral: plan.collateral,
            l_collateral,
            l_debt,
            timestamp,
        });
        Ok(())
    }

    /// Refresh the stake snapshots from the current system totals
    pub(crate) fn update_system_snapshots(&mut self, timestamp: u64) {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = self.entire_system_coll();
        self.events.emit(TrovexEvent::SystemSnapshotsUpdated {
            total_stakes_snapshot: self.total_stakes_snapshot,
            total_collateral_snapshot: self.total_collateral_snapshot,
            timestamp,
        });
    }
}
