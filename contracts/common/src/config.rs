//! Runtime Protocol Parameters
//!
//! Defaults come from [`crate::constants`]; a host may override them when
//! constructing a manager (tests use small debt limits, for example).

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{accounts, fees, limits, precision, ratios};
use crate::errors::{TrovexError, TrovexResult};
use crate::types::Address;

/// Parameters consulted by every Trovex operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProtocolParams {
    /// Minimum collateral ratio
    pub mcr: u128,
    /// Critical collateral ratio (recovery mode threshold)
    pub ccr: u128,
    /// Minimum net debt of an active Trove
    pub min_net_debt: u128,
    /// Stable-asset gas compensation reserved per Trove
    pub gas_compensation: u128,
    /// Borrowing fee floor
    pub borrowing_fee_floor: u128,
    /// Borrowing fee cap
    pub max_borrowing_fee: u128,
    /// Redemption fee floor
    pub redemption_fee_floor: u128,
    /// Per-minute base rate decay factor
    pub minute_decay_factor: u128,
    /// Redemption base rate divisor
    pub beta: u128,
    /// Capacity of the sorted index
    pub max_troves: u64,
    /// Recipient of borrowing and redemption fees
    pub fee_recipient: Address,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            mcr: ratios::MCR,
            ccr: ratios::CCR,
            min_net_debt: limits::MIN_NET_DEBT,
            gas_compensation: limits::GAS_COMPENSATION,
            borrowing_fee_floor: fees::BORROWING_FEE_FLOOR,
            max_borrowing_fee: fees::MAX_BORROWING_FEE,
            redemption_fee_floor: fees::REDEMPTION_FEE_FLOOR,
            minute_decay_factor: fees::MINUTE_DECAY_FACTOR,
            beta: fees::BETA,
            max_troves: limits::MAX_TROVES,
            fee_recipient: accounts::FEE_RECIPIENT,
        }
    }
}

impl ProtocolParams {
    /// Defaults with custom debt limits
    pub fn with_debt_limits(min_net_debt: u128, gas_compensation: u128) -> Self {
        Self {
            min_net_debt,
            gas_compensation,
            ..Self::default()
        }
    }

    /// Minimum total debt of an active Trove
    pub fn min_debt(&self) -> u128 {
        self.min_net_debt.saturating_add(self.gas_compensation)
    }

    /// Check parameter consistency
    pub fn validate(&self) -> TrovexResult<()> {
        let one = precision::DECIMAL_PRECISION;

        if self.mcr <= one {
            return Err(TrovexError::InvalidParameter {
                param: "mcr",
                reason: "must exceed 100%",
            });
        }
        if self.ccr < self.mcr {
            return Err(TrovexError::InvalidParameter {
                param: "ccr",
                reason: "must not be below mcr",
            });
        }
        if self.min_net_debt == 0 {
            return Err(TrovexError::InvalidParameter {
                param: "min_net_debt",
                reason: "must be positive",
            });
        }
        if self.borrowing_fee_floor > self.max_borrowing_fee || self.max_borrowing_fee > one {
            return Err(TrovexError::InvalidParameter {
                param: "max_borrowing_fee",
                reason: "must lie between the floor and 100%",
            });
        }
        if self.redemption_fee_floor > one {
            return Err(TrovexError::InvalidParameter {
                param: "redemption_fee_floor",
                reason: "must not exceed 100%",
            });
        }
        if self.minute_decay_factor == 0 || self.minute_decay_factor >= one {
            return Err(TrovexError::InvalidParameter {
                param: "minute_decay_factor",
                reason: "must lie strictly between 0 and 1",
            });
        }
        if self.beta == 0 {
            return Err(TrovexError::InvalidParameter {
                param: "beta",
                reason: "must be positive",
            });
        }
        if self.max_troves == 0 {
            return Err(TrovexError::InvalidParameter {
                param: "max_troves",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}
