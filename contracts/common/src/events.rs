//! Protocol Events for Trovex
//!
//! Every operation records typed events into an [`EventLog`]; the host
//! drains the log after each call to index state changes off the core.

use crate::types::Address;
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Trove Events (0x01 - 0x1F)
    TroveOpened = 0x01,
    TroveUpdated = 0x02,
    TroveClosed = 0x03,
    TroveLiquidated = 0x04,
    TroveRedeemed = 0x05,
    BorrowingFeePaid = 0x06,

    // Liquidation Events (0x20 - 0x3F)
    Liquidation = 0x20,
    Redistribution = 0x21,
    TotalStakesUpdated = 0x22,
    SystemSnapshotsUpdated = 0x23,

    // Stability Pool Events (0x40 - 0x5F)
    StabilityDeposit = 0x40,
    StabilityWithdrawal = 0x41,
    CollateralGainWithdrawn = 0x42,
    StabilityOffset = 0x43,
    EpochUpdated = 0x44,
    ScaleUpdated = 0x45,

    // Fee and Redemption Events (0x60 - 0x7F)
    BaseRateUpdated = 0x60,
    LastFeeOpTimeUpdated = 0x61,
    Redemption = 0x62,

    // Surplus Events (0x80 - 0x9F)
    SurplusAccounted = 0x80,
    SurplusClaimed = 0x81,
}

/// Operation that caused a Trove update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum TroveOperation {
    OpenTrove = 0,
    AdjustTrove = 1,
    CloseTrove = 2,
    ApplyPendingRewards = 3,
    LiquidateInNormalMode = 4,
    LiquidateInRecoveryMode = 5,
    RedeemCollateral = 6,
}

/// Main event enum containing all Trovex events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum TrovexEvent {
    // ============ Trove Events ============

    /// Emitted when a Trove is opened
    TroveOpened {
        owner: Address,
        collateral: u128,
        debt: u128,
        stake: u128,
        array_index: u64,
        timestamp: u64,
    },

    /// Emitted whenever a Trove's recorded amounts change
    TroveUpdated {
        owner: Address,
        collateral: u128,
        debt: u128,
        stake: u128,
        operation: TroveOperation,
        timestamp: u64,
    },

    /// Emitted when the owner closes a Trove
    TroveClosed {
        owner: Address,
        collateral_returned: u128,
        debt_repaid: u128,
        timestamp: u64,
    },

    /// Emitted for each Trove removed by a liquidation
    TroveLiquidated {
        owner: Address,
        debt: u128,
        collateral: u128,
        operation: TroveOperation,
        timestamp: u64,
    },

    /// Emitted for each Trove touched by a redemption
    TroveRedeemed {
        owner: Address,
        debt_redeemed: u128,
        collateral_drawn: u128,
        closed: bool,
        timestamp: u64,
    },

    /// Emitted when a borrowing fee is charged
    BorrowingFeePaid {
        owner: Address,
        fee: u128,
        timestamp: u64,
    },

    // ============ Liquidation Events ============

    /// Emitted once per liquidation call with the aggregate totals
    Liquidation {
        liquidator: Address,
        troves_liquidated: u32,
        liquidated_debt: u128,
        liquidated_collateral: u128,
        collateral_gas_compensation: u128,
        stable_gas_compensation: u128,
        timestamp: u64,
    },

    /// Emitted when debt and collateral are redistributed to active Troves
    Redistribution {
        debt: u128,
        collateral: u128,
        l_collateral: u128,
        l_debt: u128,
        timestamp: u64,
    },

    /// Emitted when total stakes change
    TotalStakesUpdated {
        total_stakes: u128,
        timestamp: u64,
    },

    /// Emitted when the stake snapshots are refreshed after a liquidation
    SystemSnapshotsUpdated {
        total_stakes_snapshot: u128,
        total_collateral_snapshot: u128,
        timestamp: u64,
    },

    // ============ Stability Pool Events ============

    /// Emitted when stable asset is deposited to the Stability Pool
    StabilityDeposit {
        depositor: Address,
        amount: u128,
        new_deposit: u128,
        pool_total: u128,
        timestamp: u64,
    },

    /// Emitted when stable asset is withdrawn from the Stability Pool
    StabilityWithdrawal {
        depositor: Address,
        amount_withdrawn: u128,
        remaining_deposit: u128,
        pool_total: u128,
        timestamp: u64,
    },

    /// Emitted when a depositor's collateral gain is paid out
    CollateralGainWithdrawn {
        depositor: Address,
        collateral: u128,
        debt_loss: u128,
        timestamp: u64,
    },

    /// Emitted when the Stability Pool absorbs liquidated debt
    StabilityOffset {
        debt_offset: u128,
        collateral_gained: u128,
        new_pool_total: u128,
        timestamp: u64,
    },

    /// Emitted when the Stability Pool is emptied and a new epoch starts
    EpochUpdated {
        epoch: u64,
        timestamp: u64,
    },

    /// Emitted when the running product is rescaled
    ScaleUpdated {
        scale: u64,
        timestamp: u64,
    },

    // ============ Fee and Redemption Events ============

    /// Emitted when the stored base rate changes
    BaseRateUpdated {
        base_rate: u128,
        timestamp: u64,
    },

    /// Emitted when the last fee operation time moves forward
    LastFeeOpTimeUpdated {
        timestamp: u64,
    },

    /// Emitted once per redemption call
    Redemption {
        redeemer: Address,
        attempted_amount: u128,
        actual_amount: u128,
        collateral_sent: u128,
        collateral_fee: u128,
        timestamp: u64,
    },

    // ============ Surplus Events ============

    /// Emitted when collateral is credited to an owner's surplus
    SurplusAccounted {
        owner: Address,
        amount: u128,
        new_balance: u128,
        timestamp: u64,
    },

    /// Emitted when an owner claims their surplus
    SurplusClaimed {
        owner: Address,
        amount: u128,
        timestamp: u64,
    },
}

impl TrovexEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::TroveOpened { .. } => EventType::TroveOpened,
            Self::TroveUpdated { .. } => EventType::TroveUpdated,
            Self::TroveClosed { .. } => EventType::TroveClosed,
            Self::TroveLiquidated { .. } => EventType::TroveLiquidated,
            Self::TroveRedeemed { .. } => EventType::TroveRedeemed,
            Self::BorrowingFeePaid { .. } => EventType::BorrowingFeePaid,
            Self::Liquidation { .. } => EventType::Liquidation,
            Self::Redistribution { .. } => EventType::Redistribution,
            Self::TotalStakesUpdated { .. } => EventType::TotalStakesUpdated,
            Self::SystemSnapshotsUpdated { .. } => EventType::SystemSnapshotsUpdated,
            Self::StabilityDeposit { .. } => EventType::StabilityDeposit,
            Self::StabilityWithdrawal { .. } => EventType::StabilityWithdrawal,
            Self::CollateralGainWithdrawn { .. } => EventType::CollateralGainWithdrawn,
            Self::StabilityOffset { .. } => EventType::StabilityOffset,
            Self::EpochUpdated { .. } => EventType::EpochUpdated,
            Self::ScaleUpdated { .. } => EventType::ScaleUpdated,
            Self::BaseRateUpdated { .. } => EventType::BaseRateUpdated,
            Self::LastFeeOpTimeUpdated { .. } => EventType::LastFeeOpTimeUpdated,
            Self::Redemption { .. } => EventType::Redemption,
            Self::SurplusAccounted { .. } => EventType::SurplusAccounted,
            Self::SurplusClaimed { .. } => EventType::SurplusClaimed,
        }
    }

    /// Time at which the event occurred
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::TroveOpened { timestamp, .. }
            | Self::TroveUpdated { timestamp, .. }
            | Self::TroveClosed { timestamp, .. }
            | Self::TroveLiquidated { timestamp, .. }
            | Self::TroveRedeemed { timestamp, .. }
            | Self::BorrowingFeePaid { timestamp, .. }
            | Self::Liquidation { timestamp, .. }
            | Self::Redistribution { timestamp, .. }
            | Self::TotalStakesUpdated { timestamp, .. }
            | Self::SystemSnapshotsUpdated { timestamp, .. }
            | Self::StabilityDeposit { timestamp, .. }
            | Self::StabilityWithdrawal { timestamp, .. }
            | Self::CollateralGainWithdrawn { timestamp, .. }
            | Self::StabilityOffset { timestamp, .. }
            | Self::EpochUpdated { timestamp, .. }
            | Self::ScaleUpdated { timestamp, .. }
            | Self::BaseRateUpdated { timestamp, .. }
            | Self::LastFeeOpTimeUpdated { timestamp }
            | Self::Redemption { timestamp, .. }
            | Self::SurplusAccounted { timestamp, .. }
            | Self::SurplusClaimed { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EventLog {
    events: Vec<TrovexEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: TrovexEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[TrovexEvent] {
        &self.events
    }

    /// Remove and return all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<TrovexEvent> {
        core::mem::take(&mut self.events)
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&TrovexEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
