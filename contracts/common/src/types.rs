//! Core Types for the Trovex Core
//!
//! Plain data structures shared by every Trovex crate: Troves, reward
//! snapshots, pool balances and the per-call execution context.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{TrovexError, TrovexResult};
use crate::math::{compute_cr, compute_nominal_cr, safe_add, safe_sub};

/// Type alias for addresses (32-byte account identifier)
pub type Address = [u8; 32];

// ============ Trove Types ============

/// Lifecycle status of a Trove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum TroveStatus {
    /// Never opened
    #[default]
    NonExistent,
    /// Open and indexed
    Active,
    /// Closed by its owner after repaying the debt
    ClosedByOwner,
    /// Closed by a liquidation
    ClosedByLiquidation,
    /// Closed because a redemption drew all its debt
    ClosedByRedemption,
}

impl TroveStatus {
    /// True for every closed state
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::ClosedByOwner | Self::ClosedByLiquidation | Self::ClosedByRedemption
        )
    }
}

/// Snapshot of the global reward accumulators at a Trove's last touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RewardSnapshot {
    /// `L_collateral` at last touch
    pub collateral: u128,
    /// `L_debt` at last touch
    pub debt: u128,
}

/// Individual Trove state
///
/// `collateral` and `debt` exclude rewards still pending in the default
/// pool; see the manager's `entire_debt_and_coll` for the live values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Trove {
    /// Owner address, also the Trove's key
    pub owner: Address,
    /// Current status
    pub status: TroveStatus,
    /// Recorded collateral
    pub collateral: u128,
    /// Recorded debt, including gas compensation
    pub debt: u128,
    /// Share of redistribution rewards
    pub stake: u128,
    /// Accumulator snapshot used for pending rewards
    pub snapshot: RewardSnapshot,
    /// Position in the manager's owner list
    pub array_index: u64,
}

impl Trove {
    /// Creates a freshly opened Trove
    pub fn new(owner: Address, collateral: u128, debt: u128) -> Self {
        Self {
            owner,
            status: TroveStatus::Active,
            collateral,
            debt,
            stake: 0,
            snapshot: RewardSnapshot::default(),
            array_index: 0,
        }
    }

    /// Returns true if the Trove is active
    pub fn is_active(&self) -> bool {
        self.status == TroveStatus::Active
    }

    /// Debt excluding the gas compensation reserve
    pub fn net_debt(&self, gas_compensation: u128) -> u128 {
        self.debt.saturating_sub(gas_compensation)
    }

    /// Individual collateral ratio of the recorded amounts
    pub fn icr(&self, price: u128) -> u128 {
        compute_cr(self.collateral, self.debt, price)
    }

    /// Nominal collateral ratio of the recorded amounts
    pub fn nicr(&self) -> u128 {
        compute_nominal_cr(self.collateral, self.debt)
    }
}

// ============ Pool Types ============

/// Collateral and debt held by one pool (active or default)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolBalances {
    /// Collateral held
    pub collateral: u128,
    /// Debt tracked
    pub debt: u128,
}

impl PoolBalances {
    /// Add collateral and debt
    pub fn increase(&mut self, collateral: u128, debt: u128) -> TrovexResult<()> {
        let new_collateral = safe_add(self.collateral, collateral)?;
        let new_debt = safe_add(self.debt, debt)?;
        self.collateral = new_collateral;
        self.debt = new_debt;
        Ok(())
    }

    /// Remove collateral and debt
    pub fn decrease(&mut self, collateral: u128, debt: u128) -> TrovexResult<()> {
        let new_collateral = safe_sub(self.collateral, collateral)?;
        let new_debt = safe_sub(self.debt, debt)?;
        self.collateral = new_collateral;
        self.debt = new_debt;
        Ok(())
    }
}

/// Running totals of collateral entering and leaving the system
///
/// Conservation: `total_deposited - total_withdrawn` equals the collateral
/// held by the active pool, default pool, stability pool and surplus pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralLedger {
    /// Collateral deposited by borrowers
    pub total_deposited: u128,
    /// Collateral paid out (withdrawals, gas compensation, redemptions, claims)
    pub total_withdrawn: u128,
}

impl CollateralLedger {
    /// Record collateral entering the system
    pub fn deposit(&mut self, amount: u128) -> TrovexResult<()> {
        self.total_deposited = safe_add(self.total_deposited, amount)?;
        Ok(())
    }

    /// Record collateral leaving the system
    pub fn withdraw(&mut self, amount: u128) -> TrovexResult<()> {
        self.total_withdrawn = safe_add(self.total_withdrawn, amount)?;
        Ok(())
    }

    /// Collateral that should still be held by the pools
    pub fn held(&self) -> u128 {
        self.total_deposited.saturating_sub(self.total_withdrawn)
    }
}

// ============ Execution Context ============

/// Caller, oracle price and clock supplied with every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ExecutionContext {
    /// Address performing the operation
    pub caller: Address,
    /// Collateral price in stable units (18 decimals)
    pub price: u128,
    /// Current time in seconds
    pub timestamp: u64,
}

impl ExecutionContext {
    /// Create a new execution context
    pub fn new(caller: Address, price: u128, timestamp: u64) -> Self {
        Self { caller, price, timestamp }
    }

    /// Same price and time, different caller
    pub fn with_caller(&self, caller: Address) -> Self {
        Self { caller, ..*self }
    }

    /// Reject a zero price
    pub fn validate(&self) -> TrovexResult<()> {
        if self.price == 0 {
            return Err(TrovexError::InvalidPrice);
        }
        Ok(())
    }
}
