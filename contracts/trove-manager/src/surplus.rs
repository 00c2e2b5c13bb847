//! Collateral Surplus Pool
//!
//! Holds collateral owed to former Trove owners: the excess above a capped
//! recovery-mode liquidation, and whatever remains after a redemption
//! closes a Trove. Owners pull it with `claim_collateral`.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use trovex_common::{
    errors::{TrovexError, TrovexResult},
    events::TrovexEvent,
    math::{safe_add, safe_sub},
    types::{Address, ExecutionContext},
    BTreeMap,
};

use crate::state::TroveManager;

/// Claimable collateral per owner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralSurplusPool {
    balances: BTreeMap<Address, u128>,
    total: u128,
}

impl CollateralSurplusPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claimable balance of `owner`
    pub fn balance_of(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    /// Collateral held for all owners
    pub fn total(&self) -> u128 {
        self.total
    }

    /// Credit `amount` to `owner`, returning the new balance
    pub fn account_surplus(&mut self, owner: &Address, amount: u128) -> TrovexResult<u128> {
        let balance = safe_add(self.balance_of(owner), amount)?;
        let total = safe_add(self.total, amount)?;
        self.balances.insert(*owner, balance);
        self.total = total;
        Ok(balance)
    }

    /// Remove and return the owner's whole balance
    pub fn claim(&mut self, owner: &Address) -> TrovexResult<u128> {
        let amount = self.balance_of(owner);
        if amount == 0 {
            return Err(TrovexError::NoCollateralToClaim { owner: *owner });
        }
        let total = safe_sub(self.total, amount)?;
        self.balances.remove(owner);
        self.total = total;
        Ok(amount)
    }
}

impl TroveManager {
    /// Move `amount` of active-pool collateral into the owner's surplus
    pub(crate) fn send_to_surplus(&mut self, owner: &Address, amount: u128, timestamp: u64) -> TrovexResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let mut active_pool = self.active_pool;
        active_pool.decrease(amount, 0)?;
        let new_balance = self.surplus.account_surplus(owner, amount)?;
        self.active_pool = active_pool;

        self.events.emit(TrovexEvent::SurplusAccounted {
            owner: *owner,
            amount,
            new_balance,
            timestamp,
        });
        Ok(())
    }

    /// Pay out the caller's surplus collateral
    ///
    /// # Errors
    /// `NoCollateralToClaim` when nothing is owed.
    pub fn claim_collateral(&mut self, ctx: &ExecutionContext) -> TrovexResult<u128> {
        let owner = ctx.caller;
        let amount = self.surplus.balance_of(&owner);
        if amount == 0 {
            return Err(TrovexError::NoCollateralToClaim { owner });
        }
        self.check_collateral_payout(&owner, amount)?;

        let amount = self.surplus.claim(&owner)?;
        self.pay_collateral(&owner, amount)?;
        self.events.emit(TrovexEvent::SurplusClaimed {
            owner,
            amount,
            timestamp: ctx.timestamp,
        });
        Ok(amount)
    }
}
