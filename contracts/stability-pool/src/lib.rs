//! Stability Pool Accounting
//!
//! First line of defense for the Trovex system. Depositors lock stable asset
//! that absorbs liquidated debt and receive the seized collateral in return.
//!
//! ## Product-Sum Algorithm
//!
//! Per-depositor values are never iterated. Two running quantities encode
//! every liquidation:
//! - `P`: product of `(1 - loss per unit)` factors; a deposit compounds to
//!   `initial * P / P_snapshot`
//! - `S[epoch][scale]`: sum of collateral gain per unit, weighted by `P`
//!
//! ## Epochs and Scales
//!
//! - An offset that empties the pool starts a new **epoch** (`P` resets to 1)
//! - When `P` would fall below `1e9` it is multiplied by `1e9` and the
//!   **scale** increments; deposits older than one scale change are dust

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use trovex_common::{
    constants::{precision::DECIMAL_PRECISION, stability_pool::SCALE_FACTOR},
    errors::{TrovexError, TrovexResult},
    events::{EventLog, TrovexEvent},
    math::{mul_div, mul_div_rem, mul_div_up_rem, safe_add, safe_sub, wide_mul},
    types::Address,
    BTreeMap,
};

// ============ Deposit Types ============

/// Accumulator values captured when a deposit last changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DepositSnapshot {
    /// Running product `P`
    pub p: u128,
    /// `S[epoch][scale]`
    pub s: u128,
    /// Scale at snapshot time
    pub scale: u64,
    /// Epoch at snapshot time
    pub epoch: u64,
}

/// A single depositor's position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Deposit {
    /// Deposit value when the snapshot was taken
    pub initial_value: u128,
    /// Accumulator snapshot
    pub snapshot: DepositSnapshot,
}

/// Result of a deposit-changing operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepositChange {
    /// Collateral gain paid out to the depositor
    pub collateral_gain: u128,
    /// Stable asset lost to liquidations since the last snapshot
    pub debt_loss: u128,
    /// Stable asset withdrawn by this call
    pub withdrawn: u128,
    /// Deposit value after the call
    pub new_deposit: u128,
}

// ============ Stability Pool State ============

/// Aggregate Stability Pool state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StabilityPool {
    /// Stable asset held on behalf of depositors
    total_deposits: u128,
    /// Collateral gained from offsets and not yet paid out
    collateral: u128,
    /// Running product
    p: u128,
    current_scale: u64,
    current_epoch: u64,
    /// `S` per `(epoch, scale)`
    epoch_scale_to_sum: BTreeMap<(u64, u64), u128>,
    deposits: BTreeMap<Address, Deposit>,
    /// Error feedback carried into the next offset
    last_collateral_error_offset: u128,
    last_debt_loss_error_offset: u128,
}

impl Default for StabilityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StabilityPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            total_deposits: 0,
            collateral: 0,
            p: DECIMAL_PRECISION,
            current_scale: 0,
            current_epoch: 0,
            epoch_scale_to_sum: BTreeMap::new(),
            deposits: BTreeMap::new(),
            last_collateral_error_offset: 0,
            last_debt_loss_error_offset: 0,
        }
    }

    // ===== Views =====

    pub fn total_deposits(&self) -> u128 {
        self.total_deposits
    }

    pub fn collateral(&self) -> u128 {
        self.collateral
    }

    pub fn p(&self) -> u128 {
        self.p
    }

    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    /// `S` for an `(epoch, scale)` pair, zero if never written
    pub fn sum_at(&self, epoch: u64, scale: u64) -> u128 {
        self.epoch_scale_to_sum.get(&(epoch, scale)).copied().unwrap_or(0)
    }

    pub fn deposit(&self, depositor: &Address) -> Option<&Deposit> {
        self.deposits.get(depositor)
    }

    /// Number of open deposits
    pub fn depositor_count(&self) -> usize {
        self.deposits.len()
    }

    /// Deposit value after all offsets since the snapshot
    pub fn compounded_deposit(&self, depositor: &Address) -> u128 {
        match self.deposits.get(depositor) {
            Some(deposit) => self.compounded_from_snapshot(deposit),
            None => 0,
        }
    }

    /// Collateral earned since the snapshot
    pub fn depositor_collateral_gain(&self, depositor: &Address) -> TrovexResult<u128> {
        match self.deposits.get(depositor) {
            Some(deposit) => self.gain_from_snapshot(deposit),
            None => Ok(0),
        }
    }

    fn compounded_from_snapshot(&self, deposit: &Deposit) -> u128 {
        let initial = deposit.initial_value;
        let snapshot = &deposit.snapshot;

        if initial == 0 || snapshot.epoch < self.current_epoch || snapshot.p == 0 {
            return 0;
        }

        let compounded = match self.current_scale.saturating_sub(snapshot.scale) {
            0 => mul_div(initial, self.p, snapshot.p).unwrap_or(0),
            1 => mul_div(initial, self.p, snapshot.p).unwrap_or(0) / SCALE_FACTOR,
            _ => 0,
        };

        // dust below a billionth of the initial deposit is written off
        if compounded < initial / SCALE_FACTOR {
            return 0;
        }
        compounded
    }

    fn gain_from_snapshot(&self, deposit: &Deposit) -> TrovexResult<u128> {
        let snapshot = &deposit.snapshot;
        if deposit.initial_value == 0 || snapshot.p == 0 {
            return Ok(0);
        }

        let first_portion = safe_sub(self.sum_at(snapshot.epoch, snapshot.scale), snapshot.s)?;
        let second_portion = self.sum_at(snapshot.epoch, snapshot.scale + 1) / SCALE_FACTOR;
        let sum = safe_add(first_portion, second_portion)?;

        let divisor = snapshot
            .p
            .checked_mul(DECIMAL_PRECISION)
            .ok_or(TrovexError::Overflow)?;
        mul_div(deposit.initial_value, sum, divisor)
    }

    fn current_snapshot(&self) -> DepositSnapshot {
        DepositSnapshot {
            p: self.p,
            s: self.sum_at(self.current_epoch, self.current_scale),
            scale: self.current_scale,
            epoch: self.current_epoch,
        }
    }

    // ===== Depositor Operations =====

    /// Add `amount` to the depositor's position, paying out the pending gain
    pub fn provide(
        &mut self,
        depositor: &Address,
        amount: u128,
        events: &mut EventLog,
        timestamp: u64,
    ) -> TrovexResult<DepositChange> {
        if amount == 0 {
            return Err(TrovexError::ZeroAmount);
        }

        let initial = self.deposits.get(depositor).map(|d| d.initial_value).unwrap_or(0);
        let compounded = self.compounded_deposit(depositor);
        let gain = self.depositor_collateral_gain(depositor)?;

        let new_deposit = safe_add(compounded, amount)?;
        let new_total = safe_add(self.total_deposits, amount)?;
        let new_collateral = safe_sub(self.collateral, gain)?;

        // ===== Commit =====
        self.total_deposits = new_total;
        self.collateral = new_collateral;
        self.deposits.insert(
            *depositor,
            Deposit {
                initial_value: new_deposit,
                snapshot: self.current_snapshot(),
            },
        );

        let change = DepositChange {
            collateral_gain: gain,
            debt_loss: initial.saturating_sub(compounded),
            withdrawn: 0,
            new_deposit,
        };
        emit_gain(events, depositor, &change, timestamp);
        events.emit(TrovexEvent::StabilityDeposit {
            depositor: *depositor,
            amount,
            new_deposit,
            pool_total: new_total,
            timestamp,
        });

        Ok(change)
    }

    /// Withdraw up to `amount` of the compounded deposit, paying out the gain
    ///
    /// A zero `amount` only pays out the gain.
    pub fn withdraw(
        &mut self,
        depositor: &Address,
        amount: u128,
        events: &mut EventLog,
        timestamp: u64,
    ) -> TrovexResult<DepositChange> {
        let deposit = self
            .deposits
            .get(depositor)
            .copied()
            .ok_or(TrovexError::NoDeposit { depositor: *depositor })?;

        let compounded = self.compounded_from_snapshot(&deposit);
        let gain = self.gain_from_snapshot(&deposit)?;
        let withdrawn = amount.min(compounded);

        let new_deposit = compounded - withdrawn;
        let new_total = safe_sub(self.total_deposits, withdrawn)?;
        let new_collateral = safe_sub(self.collateral, gain)?;

        // ===== Commit =====
        self.total_deposits = new_total;
        self.collateral = new_collateral;
        if new_deposit == 0 {
            self.deposits.remove(depositor);
        } else {
            self.deposits.insert(
                *depositor,
                Deposit {
                    initial_value: new_deposit,
                    snapshot: self.current_snapshot(),
                },
            );
        }

        let change = DepositChange {
            collateral_gain: gain,
            debt_loss: deposit.initial_value.saturating_sub(compounded),
            withdrawn,
            new_deposit,
        };
        emit_gain(events, depositor, &change, timestamp);
        events.emit(TrovexEvent::StabilityWithdrawal {
            depositor: *depositor,
            amount_withdrawn: withdrawn,
            remaining_deposit: new_deposit,
            pool_total: new_total,
            timestamp,
        });

        Ok(change)
    }

    /// Remove the depositor's collateral gain, compounding the deposit in place
    ///
    /// # Errors
    /// * `NoDeposit` - no open deposit
    /// * `NoCollateralGain` - nothing to withdraw
    pub fn withdraw_collateral_gain(
        &mut self,
        depositor: &Address,
        events: &mut EventLog,
        timestamp: u64,
    ) -> TrovexResult<DepositChange> {
        let deposit = self
            .deposits
            .get(depositor)
            .copied()
            .ok_or(TrovexError::NoDeposit { depositor: *depositor })?;

        let gain = self.gain_from_snapshot(&deposit)?;
        if gain == 0 {
            return Err(TrovexError::NoCollateralGain { depositor: *depositor });
        }
        let compounded = self.compounded_from_snapshot(&deposit);
        let new_collateral = safe_sub(self.collateral, gain)?;

        // ===== Commit =====
        self.collateral = new_collateral;
        if compounded == 0 {
            self.deposits.remove(depositor);
        } else {
            self.deposits.insert(
                *depositor,
                Deposit {
                    initial_value: compounded,
                    snapshot: self.current_snapshot(),
                },
            );
        }

        let change = DepositChange {
            collateral_gain: gain,
            debt_loss: deposit.initial_value.saturating_sub(compounded),
            withdrawn: 0,
            new_deposit: compounded,
        };
        emit_gain(events, depositor, &change, timestamp);
        Ok(change)
    }

    // ===== Liquidation Offset =====

    /// Cancel `debt` against pool deposits and distribute `collateral`
    ///
    /// No-op when the pool is empty or `debt` is zero.
    ///
    /// # Errors
    /// `InsufficientPoolBalance` when `debt` exceeds the deposits.
    pub fn offset(
        &mut self,
        debt: u128,
        collateral: u128,
        events: &mut EventLog,
        timestamp: u64,
    ) -> TrovexResult<()> {
        let total = self.total_deposits;
        if total == 0 || debt == 0 {
            return Ok(());
        }
        if debt > total {
            return Err(TrovexError::InsufficientPoolBalance {
                available: total,
                required: debt,
            });
        }

        // ===== Per-unit rewards with error feedback =====
        let (collateral_gain_per_unit, new_collateral_error) =
            mul_div_rem(collateral, DECIMAL_PRECISION, self.last_collateral_error_offset, total)?;

        let (loss_per_unit, new_debt_error) = if debt == total {
            (DECIMAL_PRECISION, 0)
        } else {
            mul_div_up_rem(debt, DECIMAL_PRECISION, self.last_debt_loss_error_offset, total)?
        };
        let loss_per_unit = loss_per_unit.min(DECIMAL_PRECISION);

        // ===== Sum and product =====
        let current_sum = self.sum_at(self.current_epoch, self.current_scale);
        let marginal_gain = wide_mul(collateral_gain_per_unit, self.p)?;
        let new_sum = safe_add(current_sum, marginal_gain)?;

        let product_factor = DECIMAL_PRECISION - loss_per_unit;
        let (new_p, new_scale, new_epoch) = if product_factor == 0 {
            (DECIMAL_PRECISION, 0, self.current_epoch + 1)
        } else if mul_div(self.p, product_factor, DECIMAL_PRECISION)? < SCALE_FACTOR {
            (
                mul_div(self.p, product_factor * SCALE_FACTOR, DECIMAL_PRECISION)?,
                self.current_scale + 1,
                self.current_epoch,
            )
        } else {
            (
                mul_div(self.p, product_factor, DECIMAL_PRECISION)?,
                self.current_scale,
                self.current_epoch,
            )
        };
        if new_p == 0 {
            return Err(TrovexError::Underflow);
        }

        let new_total = safe_sub(total, debt)?;
        let new_pool_collateral = safe_add(self.collateral, collateral)?;

        // ===== Commit =====
        self.epoch_scale_to_sum
            .insert((self.current_epoch, self.current_scale), new_sum);
        self.last_collateral_error_offset = new_collateral_error;
        self.last_debt_loss_error_offset = new_debt_error;

        if new_epoch != self.current_epoch {
            events.emit(TrovexEvent::EpochUpdated { epoch: new_epoch, timestamp });
        }
        if new_scale != self.current_scale {
            events.emit(TrovexEvent::ScaleUpdated { scale: new_scale, timestamp });
        }
        self.p = new_p;
        self.current_scale = new_scale;
        self.current_epoch = new_epoch;
        self.total_deposits = new_total;
        self.collateral = new_pool_collateral;

        events.emit(TrovexEvent::StabilityOffset {
            debt_offset: debt,
            collateral_gained: collateral,
            new_pool_total: new_total,
            timestamp,
        });

        Ok(())
    }
}

fn emit_gain(events: &mut EventLog, depositor: &Address, change: &DepositChange, timestamp: u64) {
    if change.collateral_gain > 0 || change.debt_loss > 0 {
        events.emit(TrovexEvent::CollateralGainWithdrawn {
            depositor: *depositor,
            collateral: change.collateral_gain,
            debt_loss: change.debt_loss,
            timestamp,
        });
    }
}

// ============ Tests ============
