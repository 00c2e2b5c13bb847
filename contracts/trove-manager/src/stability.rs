//! Stability Pool Integration
//!
//! Moves stable asset between depositors and the pool account and pays out
//! collateral gains. The accounting itself lives in `trovex-stability-pool`.

use trovex_common::{
    constants::accounts,
    errors::{TrovexError, TrovexResult},
    types::ExecutionContext,
};
use trovex_stability_pool::DepositChange;

use crate::borrower_operations::CollateralSource;
use crate::state::{Hints, TroveManager};

impl TroveManager {
    /// Deposit `amount` of the caller's stable asset into the pool
    ///
    /// Any pending collateral gain is paid out first.
    pub fn provide_to_stability_pool(&mut self, ctx: &ExecutionContext, amount: u128) -> TrovexResult<DepositChange> {
        ctx.validate()?;
        let depositor = ctx.caller;
        self.token.require_balance(&depositor, amount)?;
        let gain = self.stability_pool.depositor_collateral_gain(&depositor)?;
        self.check_collateral_payout(&depositor, gain)?;

        let change = self
            .stability_pool
            .provide(&depositor, amount, &mut self.events, ctx.timestamp)?;
        self.token.transfer(&depositor, &accounts::STABILITY_POOL, amount)?;
        self.pay_collateral(&depositor, change.collateral_gain)?;
        Ok(change)
    }

    /// Withdraw up to `amount` of the caller's compounded deposit
    ///
    /// A zero `amount` only pays out the collateral gain.
    ///
    /// # Errors
    /// * `NoDeposit` - the caller has no deposit
    /// * `WithdrawalWithUndercollateralizedTroves` - a Trove sits below MCR
    pub fn withdraw_from_stability_pool(&mut self, ctx: &ExecutionContext, amount: u128) -> TrovexResult<DepositChange> {
        ctx.validate()?;
        let depositor = ctx.caller;
        if self.stability_pool.deposit(&depositor).is_none() {
            return Err(TrovexError::NoDeposit { depositor });
        }
        if amount > 0 {
            self.require_no_undercollateralized_troves(ctx.price)?;
        }

        let withdrawable = amount.min(self.stability_pool.compounded_deposit(&depositor));
        self.token
            .require_balance(&accounts::STABILITY_POOL, withdrawable)?;
        let gain = self.stability_pool.depositor_collateral_gain(&depositor)?;
        self.check_collateral_payout(&depositor, gain)?;

        let change = self
            .stability_pool
            .withdraw(&depositor, amount, &mut self.events, ctx.timestamp)?;
        self.token
            .transfer(&accounts::STABILITY_POOL, &depositor, change.withdrawn)?;
        self.pay_collateral(&depositor, change.collateral_gain)?;
        Ok(change)
    }

    /// Move the caller's collateral gain into their active Trove
    ///
    /// Validated like any collateral top-up; the deposit itself stays in
    /// the pool.
    pub fn withdraw_collateral_gain_to_trove(&mut self, ctx: &ExecutionContext, hints: Hints) -> TrovexResult<DepositChange> {
        ctx.validate()?;
        let depositor = ctx.caller;
        if self.stability_pool.deposit(&depositor).is_none() {
            return Err(TrovexError::NoDeposit { depositor });
        }
        let gain = self.stability_pool.depositor_collateral_gain(&depositor)?;
        if gain == 0 {
            return Err(TrovexError::NoCollateralGain { depositor });
        }

        let plan = self.plan_adjustment(ctx, &depositor, gain, 0, 0, 0, 0)?;

        let change = self
            .stability_pool
            .withdraw_collateral_gain(&depositor, &mut self.events, ctx.timestamp)?;
        self.commit_adjustment(ctx, &plan, hints, CollateralSource::StabilityPoolGain)?;
        Ok(change)
    }

    /// The lowest-ranked Trove must be at or above MCR
    fn require_no_undercollateralized_troves(&self, price: u128) -> TrovexResult<()> {
        if let Some(lowest) = self.sorted.last() {
            let lowest_icr = self.current_icr(&lowest, price)?;
            if lowest_icr < self.params.mcr {
                return Err(TrovexError::WithdrawalWithUndercollateralizedTroves { lowest_icr });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_provide_and_withdraw() {
        let mut manager = new_manager();
        let alice = addr(1);
        open(&mut manager, alice, 20 * ONE, 2_000 * ONE).unwrap();
        open(&mut manager, addr(2), 20 * ONE, 2_000 * ONE).unwrap();

        let change = provide(&mut manager, alice, 1_500 * ONE).unwrap();
        assert_eq!(change.new_deposit, 1_500 * ONE);
        assert_eq!(manager.token().balance_of(&alice), 500 * ONE);
        assert_eq!(manager.token().balance_of(&accounts::STABILITY_POOL), 1_500 * ONE);

        let change = manager
            .withdraw_from_stability_pool(&ctx(alice, PRICE, 0), 2_000 * ONE)
            .unwrap();
        assert_eq!(change.withdrawn, 1_500 * ONE);
        assert_eq!(manager.token().balance_of(&alice), 2_000 * ONE);
        assert!(manager.stability_pool().deposit(&alice).is_none());
        assert_invariants(&manager);

        assert_eq!(
            manager.withdraw_from_stability_pool(&ctx(alice, PRICE, 0), ONE),
            Err(TrovexError::NoDeposit { depositor: alice })
        );
        assert!(matches!(
            provide(&mut manager, alice, 3_000 * ONE),
            Err(TrovexError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_withdrawal_blocked_by_undercollateralized_trove() {
        let mut manager = new_manager();
        let alice = addr(1);
        open(&mut manager, alice, 44_200 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(2), 16_575 * ONE / 1_000, 2_000 * ONE).unwrap();
        provide(&mut manager, alice, 1_000 * ONE).unwrap();

        // addr(2) drops to 90% at price 120
        let context = ctx(alice, 120 * ONE, 0);
        assert!(matches!(
            manager.withdraw_from_stability_pool(&context, ONE),
            Err(TrovexError::WithdrawalWithUndercollateralizedTroves { .. })
        ));

        // claiming only the gain is still allowed
        manager.withdraw_from_stability_pool(&context, 0).unwrap();
        assert_eq!(manager.stability_pool().compounded_deposit(&alice), 1_000 * ONE);
        assert_invariants(&manager);
    }

    #[test]
    fn test_collateral_gain_to_trove() {
        let mut manager = new_manager();
        let alice = addr(1);
        open(&mut manager, alice, 44_200 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(2), 33_150 * ONE / 1_000, 2_000 * ONE).unwrap();
        open(&mut manager, addr(3), 16_575 * ONE / 1_000, 2_000 * ONE).unwrap();
        provide(&mut manager, alice, 2_000 * ONE).unwrap();
        provide(&mut manager, addr(2), 2_000 * ONE).unwrap();

        assert_eq!(
            manager.withdraw_collateral_gain_to_trove(&ctx(alice, PRICE, 0), Hints::none()),
            Err(TrovexError::NoCollateralGain { depositor: alice })
        );

        manager.liquidate(&ctx(addr(9), 120 * ONE, 0), &addr(3)).unwrap();
        let gain = manager.stability_pool().depositor_collateral_gain(&alice).unwrap();
        assert!(gain > 0);
        let held_before = manager.collateral_ledger().held();

        let change = manager
            .withdraw_collateral_gain_to_trove(&ctx(alice, 120 * ONE, 0), Hints::none())
            .unwrap();
        assert_eq!(change.collateral_gain, gain);
        assert_eq!(manager.trove(&alice).unwrap().collateral, 44_200 * ONE / 1_000 + gain);
        assert_eq!(manager.stability_pool().depositor_collateral_gain(&alice).unwrap(), 0);
        // collateral moved between pools, nothing entered or left
        assert_eq!(manager.collateral_ledger().held(), held_before);
        assert_eq!(manager.collateral_paid_to(&alice), 0);
        assert_invariants(&manager);

        assert_eq!(
            manager.withdraw_collateral_gain_to_trove(&ctx(addr(7), PRICE, 0), Hints::none()),
            Err(TrovexError::NoDeposit { depositor: addr(7) })
        );
    }
}
